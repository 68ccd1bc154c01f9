//! Engine error taxonomy.
//!
//! Three classes, mirroring where a failure can originate:
//! - `Configuration`: invalid registration or a query against an unknown counter
//! - `Predicate`: a predicate or extractor closure failed while evaluated
//! - `Storage`: a key-value primitive failed; propagated, never retried here

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// Invalid or missing registration fields, or an unregistered counter name.
    Configuration(String),
    /// A predicate/extractor failed during evaluation of a single event.
    Predicate(String),
    /// The key-value backend primitive failed.
    Storage(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            EngineError::Predicate(msg) => write!(f, "predicate error: {}", msg),
            EngineError::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Shorthand for the common "counter not registered" case.
    pub fn unknown_counter(name: &str) -> Self {
        EngineError::Configuration(format!("no counter registered under `{}`", name))
    }
}
