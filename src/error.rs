use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed input at line {line}, column {column}: {message}")]
    MalformedInput {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("invalid numeric value {value:?} for field `{field}`")]
    InvalidNumeric { field: String, value: String },
    #[error("unrecognized top-level shape (keys: {})", format_keys(.keys))]
    UnrecognizedTopLevelShape { keys: Vec<String> },
}

impl ParseError {
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        ParseError::MalformedInput {
            line: err.line(),
            column: err.column(),
            message: strip_position(&err.to_string()),
        }
    }
}

fn format_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        "none".to_string()
    } else {
        keys.join(", ")
    }
}

// serde_json appends " at line L column C" to its messages; the position is
// carried separately.
fn strip_position(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("plan node {index} is reachable more than once")]
    CyclicStructure { index: usize },
    #[error("plan node {index} does not exist")]
    MissingNode { index: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unsupported output format {0:?}; expected svg or html")]
    UnsupportedFormat(String),
}

/// Pipeline failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
