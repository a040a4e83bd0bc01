use std::fmt;

/// Errors raised while decoding a serialized effect rack.
///
/// Nothing else in the crate returns errors: register-range violations are
/// programming errors and panic, and dangling node references are demoted
/// during compilation.
#[derive(Debug)]
pub enum RackError {
    /// Malformed JSON, or a field with the wrong shape (this includes
    /// unknown waveform, operator and builtin-register integers).
    Json(serde_json::Error),
    /// The payload, or one of its nodes, was not a JSON object.
    NotAnObject { what: &'static str },
    /// A required field (`effects`, a node's `value`, a node's `type`) was absent.
    MissingField { field: &'static str },
    /// A node `type` tag outside the closed set of node types.
    UnknownNodeType(String),
}

/// A wire integer that does not name any variant of a closed enum.
///
/// Produced by the `TryFrom<u8>` conversions that back the integer enum tags,
/// and surfaced through serde as a [`RackError::Json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownTag {
    pub what: &'static str,
    pub tag: u8,
}

impl fmt::Display for RackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RackError::Json(e) => write!(f, "Invalid rack JSON: {e}"),
            RackError::NotAnObject { what } => write!(f, "Expected {what} to be a JSON object"),
            RackError::MissingField { field } => write!(f, "Missing required field '{field}'"),
            RackError::UnknownNodeType(tag) => write!(f, "Unknown effect node type {tag}"),
        }
    }
}

impl std::error::Error for RackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RackError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} tag {}", self.what, self.tag)
    }
}

impl std::error::Error for UnknownTag {}

impl From<serde_json::Error> for RackError {
    fn from(e: serde_json::Error) -> Self {
        RackError::Json(e)
    }
}
