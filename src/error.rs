use thiserror::Error;

/// Source location: line and column (both 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Pos { line, col }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// One error per failed compilation; the message carries the source
/// position as `line:col` where one is known.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Lex(String),

    #[error("{0}")]
    Parse(String),

    #[error("stage({stage}): {msg}")]
    Plan { stage: &'static str, msg: String },

    #[error("{0}")]
    CodeGen(String),
}

impl Error {
    pub fn plan(stage: &'static str, msg: impl Into<String>) -> Error {
        Error::Plan {
            stage,
            msg: msg.into(),
        }
    }
}
