// Workflow engine: guarded status transitions, edits, sign-offs and delivery annotations

pub mod actor;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod events;
pub mod transitions;

pub use actor::Actor;
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{delivery_slug, EngineSettings, SignOffOutcome, WorkflowEngine};
pub use errors::WorkflowError;
pub use events::{BroadcastNotifier, EventKind, LogNotifier, Notifier, WorkflowEvent};
#[cfg(any(test, feature = "testing"))]
pub use events::MockNotifier;
pub use transitions::TransitionTable;
