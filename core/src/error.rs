use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("simulator unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("simulator rejected request: {0}")]
    Remote(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("a load or step is already in flight")]
    Busy,
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    #[error("step delay must be a non-negative finite number of milliseconds, got {0}")]
    InvalidDelay(f64),
    #[error("invalid float register value {0:?}")]
    InvalidFloat(String),
    #[error("invalid memory range {start:#x}..={end:#x}")]
    InvalidRange { start: u32, end: u32 },
    #[error("syntax check needs one text per file name (got {texts} texts, {files} names)")]
    MismatchedSources { texts: usize, files: usize },
    #[error("no source files to load")]
    NoProject,
}
