use std::{error::Error, fmt};

use colored::Colorize;

use crate::lexer::Location;

#[derive(Debug, Clone, PartialEq)]
pub struct SemaError {
    pub message: String,
    pub location: Location,
}

impl SemaError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        SemaError {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location.to_string().red(), self.message)
    }
}

impl Error for SemaError {}

pub type SemaResult<T> = Result<T, SemaError>;
