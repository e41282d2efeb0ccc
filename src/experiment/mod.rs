// Experiment data model: content, sign-offs, section completeness and change history

pub mod branches;
pub mod history;
pub mod sections;
pub mod signoff;
pub mod types;
pub mod update;
pub mod validation;

pub use history::{grouped_history, ChangeLog, ChangeLogEntry, FieldChange, FieldDiffs, HistoryDay};
pub use sections::{Section, SectionReport};
pub use signoff::{Permission, SignOff};
pub use types::{
    slugify, Branch, Channel, DeliveryRef, Experiment, ExperimentContent, ExperimentKind,
    ExperimentSummary, FirefoxVersion, Platform, PrefBranch, PrefType, RiskQuestion, Status,
    UserId,
};
pub use update::ExperimentUpdate;
pub use validation::{ValidationErrors, ValidationRules};
