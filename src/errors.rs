/*!
Crate-wide error type, [`RobokitError`], and the [`RobokitResult`] alias.

Every failure in this crate is an immediate precondition violation
reported to the caller: there is no transient-failure class since all
operations are synchronous local calls into the simulation backend.
*/

use std::{
    error::Error,
    fmt::{Debug, Display},
};

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum RobokitErrorTypes {
    UnknownError,
    /// Invalid configuration: unrecognized control mode, unknown joint
    /// or frame name, inconsistent per-joint vector lengths.
    ConfigError,
    /// The action length does not match the declared action space.
    InvalidActionShape,
}

impl Display for RobokitErrorTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RobokitErrorTypes::UnknownError => "UnknownError",
            RobokitErrorTypes::ConfigError => "ConfigError",
            RobokitErrorTypes::InvalidActionShape => "InvalidActionShape",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone)]
pub struct RobokitError {
    error_type: RobokitErrorTypes,
    what: String,
}

impl RobokitError {
    pub fn new(error_type: RobokitErrorTypes, what: String) -> Self {
        Self { error_type, what }
    }

    pub fn detailed_error(&self) -> String {
        format!("Robokit Error of type {}: {}", self.error_type, self.what)
    }

    pub fn error_type(&self) -> RobokitErrorTypes {
        self.error_type
    }

    /// Add context to the error, keeping the original message.
    pub fn chain(self, what: String) -> Self {
        Self {
            error_type: self.error_type,
            what: format!("{}\n↪ {}", self.what, what),
        }
    }
}

impl Display for RobokitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Robokit Error: {}", self.error_type)
    }
}

impl Debug for RobokitError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Robokit Error of type {}: {}",
            self.error_type, self.what
        )
    }
}

impl Error for RobokitError {}

pub type RobokitResult<T> = Result<T, RobokitError>;
