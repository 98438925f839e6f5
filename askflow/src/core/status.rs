//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Pure reshaping of existing fields.
    #[default]
    Transform,
    /// Loads reference data, such as a database schema.
    Enrich,
    /// Calls the text generator.
    Generate,
    /// Runs a query against the database.
    Execute,
    /// Talks to the web: search or page fetches.
    Retrieve,
    /// Runs nested pipelines and combines their results.
    Merge,
    /// Records state outside the run, such as conversation memory.
    Record,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform => write!(f, "transform"),
            Self::Enrich => write!(f, "enrich"),
            Self::Generate => write!(f, "generate"),
            Self::Execute => write!(f, "execute"),
            Self::Retrieve => write!(f, "retrieve"),
            Self::Merge => write!(f, "merge"),
            Self::Record => write!(f, "record"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced its output.
    Ok,
    /// Stage was cancelled.
    Cancel,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Cancel => write!(f, "cancel"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::default().to_string(), "transform");
        assert_eq!(StageKind::Generate.to_string(), "generate");
        assert_eq!(StageKind::Retrieve.to_string(), "retrieve");
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Ok.is_success());
        assert!(StageStatus::Fail.is_failure());
        assert!(StageStatus::Cancel.is_failure());
        assert!(!StageStatus::Cancel.is_success());
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serde_json::to_string(&StageStatus::Ok).unwrap(), r#""ok""#);
        assert_eq!(serde_json::to_string(&StageKind::Merge).unwrap(), r#""merge""#);
        let kind: StageKind = serde_json::from_str(r#""execute""#).unwrap();
        assert_eq!(kind, StageKind::Execute);
    }
}
