use futures::{Stream, StreamExt};

use crate::escape_text;

/// Everything a byte stream produced before it ended.
#[derive(Debug)]
pub struct Collected<E> {
    pub chunks: Vec<Vec<u8>>,
    /// The error the stream ended with, if any.
    pub error: Option<E>,
    /// Items seen after the error; a well-behaved stream has none.
    pub after_error: usize,
}

impl<E> Collected<E> {
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

/// Drain `stream`, keeping chunk boundaries.
pub async fn collect_chunks<S, B, E>(stream: S) -> Collected<E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut collected = Collected {
        chunks: Vec::new(),
        error: None,
        after_error: 0,
    };
    while let Some(item) = stream.next().await {
        if collected.error.is_some() {
            collected.after_error += 1;
            continue;
        }
        match item {
            Ok(chunk) => collected.chunks.push(chunk.as_ref().to_vec()),
            Err(err) => collected.error = Some(err),
        }
    }
    collected
}

/// One escaped line per chunk, for diffing chunk boundaries.
pub fn chunk_lines(chunks: &[Vec<u8>]) -> Vec<String> {
    chunks
        .iter()
        .map(|chunk| escape_text(&String::from_utf8_lossy(chunk)))
        .collect()
}
