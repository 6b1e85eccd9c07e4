#![no_main]

use libfuzzer_sys::fuzz_target;
use tools::utf8::{Utf8Decoder, decode_lossy};

fuzz_target!(|data: &[u8]| {
    let Some((&split, bytes)) = data.split_first() else {
        return;
    };
    let step = usize::from(split % 7) + 1;
    let mut decoder = Utf8Decoder::new();
    for chunk in bytes.chunks(step) {
        decoder.push(chunk);
    }
    assert_eq!(decoder.finish(), decode_lossy(bytes));
});
