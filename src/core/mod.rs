pub mod driver;
pub mod engine;
pub mod executor;
pub mod hasher;
pub mod reconciler;
pub mod scanner;
pub mod snapshot;

pub use driver::{IntervalSchedule, Schedule, SyncDriver};
pub use engine::{CycleKind, CycleReport, SyncEngine};
pub use executor::{ActionExecutor, ActionRecord, RecordKind};
pub use hasher::{calculate_file_hash, calculate_hash};
pub use reconciler::{Action, ActionSummary, Plan, Reconciler};
pub use scanner::TreeScanner;
pub use snapshot::{DirSnapshot, FileSnapshot, TreeSnapshot};
