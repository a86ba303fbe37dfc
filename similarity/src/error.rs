#[derive(Debug)]
pub enum Error {
    NotFound(String),
    QueueEmpty,
    DimensionMismatch { expected: usize, found: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "{msg}"),
            Error::QueueEmpty => write!(f, "queue unexpectedly empty"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for vex_types::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound(msg) => vex_types::Error::not_found("node", msg),
            Error::QueueEmpty => vex_types::Error::InvalidInput("search queue empty".to_string()),
            Error::DimensionMismatch { expected, found } => {
                vex_types::Error::DimensionMismatch {
                    expected,
                    got: found,
                }
            }
        }
    }
}
