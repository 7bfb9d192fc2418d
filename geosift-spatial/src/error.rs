//! Error types for the analysis engine.

use crate::geometry::LayerKind;
use std::fmt;
use thiserror::Error;

/// Analysis errors.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// WKT parsing error.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// Invalid geometry (e.g., a region that is not polygonal).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Two features in one layer share an identity.
    #[error("Duplicate feature id '{id}' in layer '{layer}'")]
    DuplicateFeature { layer: String, id: String },

    /// Layer id not registered in the store.
    #[error("Unknown layer id: {0}")]
    UnknownLayer(u32),

    /// One or more preconditions failed before any work was started.
    ///
    /// Every cause is listed once, in the order it was detected.
    #[error("{}", PreconditionList(.0))]
    Preconditions(Vec<PreconditionFailure>),

    /// Predicate query failed in the feature store.
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failed to complete.
    #[error("Task error: {0}")]
    Task(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpatialError {
    /// Precondition failures carried by this error, if any.
    pub fn preconditions(&self) -> &[PreconditionFailure] {
        match self {
            SpatialError::Preconditions(failures) => failures,
            _ => &[],
        }
    }
}

/// A single reason an operation refused to start.
#[derive(Debug, Clone, PartialEq)]
pub enum PreconditionFailure {
    /// No layer title contains the role's name pattern.
    MissingLayer { role: String, pattern: String },

    /// The bound layer carries the wrong geometry kind.
    WrongKind {
        role: String,
        title: String,
        expected: LayerKind,
        actual: LayerKind,
    },

    /// A user-supplied parameter is not a finite non-negative number.
    InvalidParameter { name: String, value: String },

    /// The search was started without a search area.
    MissingSearchArea,
}

impl fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionFailure::MissingLayer { role, pattern } => {
                write!(f, "{role} layer ({pattern}) not found")
            }
            PreconditionFailure::WrongKind {
                role,
                title,
                expected,
                actual,
            } => write!(
                f,
                "{role} layer ({title}) geometry is {actual}, expected {expected}"
            ),
            PreconditionFailure::InvalidParameter { name, value } => {
                write!(f, "{name}: '{value}' is not a non-negative number")
            }
            PreconditionFailure::MissingSearchArea => write!(f, "search area not selected"),
        }
    }
}

struct PreconditionList<'a>(&'a Vec<PreconditionFailure>);

impl fmt::Display for PreconditionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Precondition failed: ")?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, SpatialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_list_lists_every_cause() {
        let err = SpatialError::Preconditions(vec![
            PreconditionFailure::MissingLayer {
                role: "roads".into(),
                pattern: "KEL_L".into(),
            },
            PreconditionFailure::WrongKind {
                role: "land cover".into(),
                title: "plo.shp#PLO_P".into(),
                expected: LayerKind::Polygon,
                actual: LayerKind::Line,
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("roads layer (KEL_L) not found"));
        assert!(msg.contains("geometry is line, expected polygon"));
        assert_eq!(err.preconditions().len(), 2);
    }
}
