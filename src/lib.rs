// Experimenter Library - experiment review workflow
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod delivery;
pub mod experiment;
pub mod observability;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use config::{config, init_config, ExperimenterConfig};
pub use delivery::{DeliveryClient, DeliveryError, NormandyClient, RecipeStatus};
pub use experiment::{
    Branch, Experiment, ExperimentKind, ExperimentSummary, ExperimentUpdate, Permission, SignOff,
    Status, UserId,
};
pub use observability::{workflow_metrics, OperationTimer, WorkflowMetrics};
pub use service::ExperimentService;
pub use store::{ExperimentStore, FileExperimentStore, ListFilter, MemoryExperimentStore, StoreError};
pub use telemetry::{create_command_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    Actor, BroadcastNotifier, EngineSettings, Notifier, WorkflowEngine, WorkflowError, WorkflowEvent,
};
