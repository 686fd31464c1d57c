//! Error and defect types.
//!
//! Two families live here:
//! - [`LoadError`] - the document cannot be turned into a model tree at all.
//! - [`Defect`] - something is wrong *inside* a model. Defects are values,
//!   collected into lists and reports, never propagated with `?`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors that stop a document from being read.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The XML is not well-formed.
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// The document contains no elements.
    #[error("document is empty")]
    EmptyDocument,

    /// The root element is neither `<ormRoot:ORM2>` nor `<orm:ORMModel>`.
    #[error("root of input must be <ormRoot:ORM2>, found <{found}>")]
    UnexpectedRoot { found: String },

    /// `<ormRoot:ORM2>` has no `<orm:ORMModel>` child.
    #[error("cannot find <orm:ORMModel> in input")]
    MissingModel,

    /// The model element is bound to a namespace this checker does not read.
    #[error("unsupported namespace '{namespace}' on <{element}>")]
    UnsupportedNamespace { element: String, namespace: String },

    /// Reading the input file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Kind of a model defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefectKind {
    DuplicateIdentifier,
    UnresolvedReference,
    KindMismatch,
    PlaceholderIndexOutOfRange,
    MalformedImpliedConstraint,
    MissingMandatoryConstraint,
    InvalidFrequencyRange,
    InvalidValueRangeBracket,
    DegenerateFactType,
    RoleOwnershipConflict,
    InvalidConstraintScope,
    MalformedRoleSequence,
    MalformedElement,
    InvalidSubtypeGraph,
}

impl DefectKind {
    /// Stable code used in rendered reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::KindMismatch => "KIND_MISMATCH",
            Self::PlaceholderIndexOutOfRange => "PLACEHOLDER_INDEX_OUT_OF_RANGE",
            Self::MalformedImpliedConstraint => "MALFORMED_IMPLIED_CONSTRAINT",
            Self::MissingMandatoryConstraint => "MISSING_MANDATORY_CONSTRAINT",
            Self::InvalidFrequencyRange => "INVALID_FREQUENCY_RANGE",
            Self::InvalidValueRangeBracket => "INVALID_VALUE_RANGE_BRACKET",
            Self::DegenerateFactType => "DEGENERATE_FACT_TYPE",
            Self::RoleOwnershipConflict => "ROLE_OWNERSHIP_CONFLICT",
            Self::InvalidConstraintScope => "INVALID_CONSTRAINT_SCOPE",
            Self::MalformedRoleSequence => "MALFORMED_ROLE_SEQUENCE",
            Self::MalformedElement => "MALFORMED_ELEMENT",
            Self::InvalidSubtypeGraph => "INVALID_SUBTYPE_GRAPH",
        }
    }

    /// Reference-resolution kinds, re-checked by the validator after a build.
    pub fn is_reference_defect(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference | Self::KindMismatch | Self::DuplicateIdentifier
        )
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single problem found in a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Defect {
    /// What went wrong.
    pub kind: DefectKind,
    /// Document identifier of the offending entity.
    pub entity: String,
    /// Human-readable description.
    pub message: String,
}

impl Defect {
    pub fn new(kind: DefectKind, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.code(), self.entity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defect_display() {
        let defect = Defect::new(
            DefectKind::InvalidFrequencyRange,
            "_FC1",
            "min frequency 5 exceeds max frequency 2",
        );
        assert_eq!(
            defect.to_string(),
            "[INVALID_FREQUENCY_RANGE] _FC1: min frequency 5 exceeds max frequency 2"
        );
    }

    #[test]
    fn reference_kinds() {
        assert!(DefectKind::UnresolvedReference.is_reference_defect());
        assert!(DefectKind::KindMismatch.is_reference_defect());
        assert!(!DefectKind::MissingMandatoryConstraint.is_reference_defect());
    }

    #[test]
    fn load_error_display() {
        let err = LoadError::UnexpectedRoot {
            found: "Model".to_string(),
        };
        assert!(err.to_string().contains("<ormRoot:ORM2>"));
        assert!(err.to_string().contains("Model"));
    }
}
