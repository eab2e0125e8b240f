//! Error types.
//!
//! Only conditions that abort a run are errors. Running out of time in one
//! search direction and proving the goal unreachable are ordinary outcomes
//! (see [`crate::search::SearchOutcome`]).

use std::fmt::{Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum PlannerError {
    /// The grounded model violates an encoding invariant.
    Model { entity: String, message: String },
    /// File I/O error.
    Io(io::Error),
    /// Malformed input or persisted artifact.
    Parse(String),
    /// A successor landed left of the current f-diagonal.
    HeuristicInconsistency { f: u32, g: u32, h: u32 },
    /// No action explains a recorded layer transition.
    Reconstruction { bucket: u32, message: String },
}

impl PlannerError {
    pub fn model(entity: impl Into<String>, message: impl Into<String>) -> Self {
        PlannerError::Model {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn reconstruction(bucket: u32, message: impl Into<String>) -> Self {
        PlannerError::Reconstruction {
            bucket,
            message: message.into(),
        }
    }
}

impl From<io::Error> for PlannerError {
    fn from(e: io::Error) -> Self {
        PlannerError::Io(e)
    }
}

impl Display for PlannerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannerError::Model { entity, message } => write!(f, "Model error in '{}': {}", entity, message),
            PlannerError::Io(e) => write!(f, "I/O error: {}", e),
            PlannerError::Parse(msg) => write!(f, "Parse error: {}", msg),
            PlannerError::HeuristicInconsistency { f: fmin, g, h } => write!(
                f,
                "Heuristic not consistent: successor in bucket (g = {}, h = {}) left of f-diagonal {}",
                g, h, fmin
            ),
            PlannerError::Reconstruction { bucket, message } => {
                write!(f, "Plan reconstruction failed at bucket {}: {}", bucket, message)
            }
        }
    }
}

impl std::error::Error for PlannerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlannerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_entity() {
        let e = PlannerError::model("drive.truck1", "conflicting effects on partition 3");
        assert_eq!(
            e.to_string(),
            "Model error in 'drive.truck1': conflicting effects on partition 3"
        );

        let e = PlannerError::reconstruction(7, "no action matches");
        assert!(e.to_string().contains("bucket 7"));
    }

    #[test]
    fn test_from_io() {
        let e: PlannerError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(e, PlannerError::Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }
}
