//! Typed error hierarchy for the lead pipeline.
//!
//! `BoardError` carries one variant per concrete failure. `BoardError::kind`
//! collapses those into the five categories callers branch on:
//! - `Validation`: rejected before any persistence call
//! - `NotFound`: unknown owner, stage, or lead
//! - `Conflict`: stage key collision, populated stage without reassignment
//! - `Persistence`: the backing store call failed
//! - `PartialLoad`: one half of a full load failed; prior state kept

use thiserror::Error;
use uuid::Uuid;

/// Which half of a full board load failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPart {
    Stages,
    Leads,
    Both,
}

impl std::fmt::Display for LoadPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadPart::Stages => write!(f, "stages"),
            LoadPart::Leads => write!(f, "leads"),
            LoadPart::Both => write!(f, "stages and leads"),
        }
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Persistence,
    PartialLoad,
}

/// Errors from the stage registry and sync engine.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Owner '{owner}' is not a valid owner")]
    InvalidOwner { owner: String },

    #[error("Stage {id} not found")]
    StageNotFound { id: Uuid },

    #[error("Stage with key '{key}' not found")]
    StageKeyNotFound { key: String },

    #[error("Lead {id} not found")]
    LeadNotFound { id: Uuid },

    #[error("Stage key '{key}' is already in use")]
    StageKeyConflict { key: String },

    #[error("Stage '{key}' still holds {leads} lead(s); choose a stage to move them to")]
    StageNotEmpty { key: String, leads: usize },

    #[error("Stage {id} cannot receive leads from the deleted stage")]
    InvalidReassignTarget { id: Uuid },

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Failed to load {part}: {source}")]
    PartialLoad {
        part: LoadPart,
        #[source]
        source: anyhow::Error,
    },
}

impl BoardError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidOwner { .. }
            | Self::StageNotFound { .. }
            | Self::StageKeyNotFound { .. }
            | Self::LeadNotFound { .. } => ErrorKind::NotFound,
            Self::StageKeyConflict { .. }
            | Self::StageNotEmpty { .. }
            | Self::InvalidReassignTarget { .. } => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::PartialLoad { .. } => ErrorKind::PartialLoad,
        }
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field() {
        let err = BoardError::validation("name", "must not be empty");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Invalid name: must not be empty");
    }

    #[test]
    fn not_found_variants_share_kind() {
        let id = Uuid::new_v4();
        assert_eq!(BoardError::StageNotFound { id }.kind(), ErrorKind::NotFound);
        assert_eq!(BoardError::LeadNotFound { id }.kind(), ErrorKind::NotFound);
        assert_eq!(
            BoardError::InvalidOwner {
                owner: String::new()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn populated_stage_is_a_conflict() {
        let err = BoardError::StageNotEmpty {
            key: "proposal".into(),
            leads: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("2 lead(s)"));
    }

    #[test]
    fn partial_load_carries_source() {
        let err = BoardError::PartialLoad {
            part: LoadPart::Leads,
            source: anyhow::anyhow!("connection reset"),
        };
        assert_eq!(err.kind(), ErrorKind::PartialLoad);
        assert_eq!(err.to_string(), "Failed to load leads: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn persistence_error_is_matchable() {
        let err = BoardError::Persistence(anyhow::anyhow!("disk full"));
        match &err {
            BoardError::Persistence(inner) => assert_eq!(inner.to_string(), "disk full"),
            _ => panic!("Expected Persistence variant"),
        }
    }
}
