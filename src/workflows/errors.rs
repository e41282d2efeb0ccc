use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::experiment::{ExperimentKind, SectionReport, SignOff, Status, ValidationErrors};
use crate::store::StoreError;

/// Errors that can occur while applying a workflow command.
/// Every variant leaves the committed experiment untouched.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid transition: {from} -> {to} is not allowed")]
    InvalidTransition { from: Status, to: Status },

    #[error("Required sections incomplete: {}", join(.sections))]
    SectionsIncomplete { sections: Vec<SectionReport> },

    #[error("Missing required sign-offs: {}", join(.missing))]
    SignOffIncomplete { missing: Vec<SignOff> },

    #[error("Experiment cannot be archived or unarchived while {status}")]
    NotArchivable { status: Status },

    #[error("An experiment named {name:?} already exists")]
    DuplicateName { name: String },

    #[error("Experiment {slug} was modified concurrently: expected version {expected}, found {found}")]
    ConcurrentModification {
        slug: String,
        expected: u64,
        found: u64,
    },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Sign-offs cannot be changed while the experiment is in Draft")]
    SignOffsLocked,

    #[error("Recipe IDs can only be recorded from Review onwards (currently {status})")]
    ExportUnavailable { status: Status },

    #[error("{kind} experiments are not delivered through Normandy")]
    DeliveryNotUsed { kind: ExperimentKind },

    #[error("Experiment not found: {slug}")]
    NotFound { slug: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationErrors> for WorkflowError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { slug } => Self::NotFound { slug },
            StoreError::ConcurrentModification {
                slug,
                expected,
                found,
            } => Self::ConcurrentModification {
                slug,
                expected,
                found,
            },
            other => Self::Store(other),
        }
    }
}

impl WorkflowError {
    /// Short machine-friendly name, used as a log field and metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::SectionsIncomplete { .. } => "sections_incomplete",
            Self::SignOffIncomplete { .. } => "sign_off_incomplete",
            Self::NotArchivable { .. } => "not_archivable",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Validation(_) => "validation",
            Self::SignOffsLocked => "sign_offs_locked",
            Self::ExportUnavailable { .. } => "export_unavailable",
            Self::DeliveryNotUsed { .. } => "delivery_not_used",
            Self::NotFound { .. } => "not_found",
            Self::Store(_) => "store",
            Self::Delivery(_) => "delivery",
        }
    }
}
