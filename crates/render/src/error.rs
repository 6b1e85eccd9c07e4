use std::io;

use thiserror::Error;

/// Failure of a render. Cancellation is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A component's render function failed, or its pending output rejected.
    #[error("{} failed to render: {source:#}", describe(.display_name, .module_id.as_deref()))]
    Component {
        display_name: String,
        module_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },
    /// The queue referenced a branch the engine has no record of.
    #[error("render branch {0} is in an invalid state")]
    InvalidBranch(u32),
    #[error("failed to write rendered output")]
    Io(#[from] io::Error),
}

impl RenderError {
    pub fn component(
        display_name: impl Into<String>,
        module_id: Option<&str>,
        source: anyhow::Error,
    ) -> Self {
        Self::Component {
            display_name: display_name.into(),
            module_id: module_id.map(str::to_owned),
            source,
        }
    }

    /// Display name of the failing component, when the error carries one.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Component { display_name, .. } => Some(display_name),
            _ => None,
        }
    }
}

fn describe(display_name: &str, module_id: Option<&str>) -> String {
    let name = if display_name.is_empty() { "<deferred>" } else { display_name };
    match module_id {
        Some(module) => format!("component `{name}` ({module})"),
        None => format!("component `{name}`"),
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
