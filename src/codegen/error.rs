use std::{error::Error, fmt};

use colored::Colorize;

use crate::lexer::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError {
    pub message: String,
    pub location: Location,
}

impl CodegenError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        CodegenError {
            message: message.into(),
            location,
        }
    }

    pub fn todo(what: &str, location: Location) -> Self {
        CodegenError {
            message: format!("unsupported construct (TODO): {what}"),
            location,
        }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location.to_string().red(), self.message)
    }
}

impl Error for CodegenError {}

impl From<crate::sema::SemaError> for CodegenError {
    fn from(err: crate::sema::SemaError) -> Self {
        CodegenError {
            message: err.message,
            location: err.location,
        }
    }
}

pub type CodegenResult<T> = Result<T, CodegenError>;
