//! Error model.
//!
//! jqawk distinguishes four error kinds: syntax errors from the parser,
//! runtime errors from the evaluator, JSON decode errors from a single
//! input file, and a group of several syntax errors collected during
//! parse-error recovery.

use std::fmt;

use thiserror::Error;

/// A single source position, resolved lazily by [`crate::lexer::Lexer::locate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLoc {
    pub line: usize,
    pub col: usize,
    pub source_line: String,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caret_col = self.col.saturating_sub(1);
        let indent: String = self
            .source_line
            .chars()
            .take(caret_col)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        writeln!(f, "{}", self.source_line)?;
        write!(f, "{}^", indent)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JqawkError {
    #[error("syntax error on line {}: {message}\n{loc}", loc.line)]
    Syntax { message: String, loc: SourceLoc },

    #[error("runtime error on line {}: {message}\n{loc}", loc.line)]
    Runtime { message: String, loc: SourceLoc },

    #[error("error reading '{file}': {message}")]
    Json { message: String, file: String },

    #[error("{}", format_group(.0))]
    Group(Vec<JqawkError>),
}

fn format_group(errors: &[JqawkError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl JqawkError {
    pub fn syntax(message: impl Into<String>, loc: SourceLoc) -> Self {
        Self::Syntax {
            message: message.into(),
            loc,
        }
    }

    pub fn runtime(message: impl Into<String>, loc: SourceLoc) -> Self {
        Self::Runtime {
            message: message.into(),
            loc,
        }
    }

    pub fn json(message: impl Into<String>, file: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
            file: file.into(),
        }
    }

    pub fn cancelled(loc: SourceLoc) -> Self {
        Self::runtime("cancelled", loc)
    }

    /// Flattens a possibly-nested [`JqawkError::Group`] into its leaves.
    pub fn into_errors(self) -> Vec<JqawkError> {
        match self {
            JqawkError::Group(errors) => errors
                .into_iter()
                .flat_map(JqawkError::into_errors)
                .collect(),
            other => vec![other],
        }
    }
}

pub type JqawkResult<T> = Result<T, JqawkError>;
