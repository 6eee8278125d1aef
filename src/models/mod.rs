//! Record types shared by the stores, the scheduler and the rules.

pub mod alert;
pub mod history;
pub mod snapshot;
pub mod user;

pub use alert::{AlertDraft, AlertRecord, AlertSeverity, GENERAL_ELEMENT};
pub use history::{HistoryRecord, RecordKind};
pub use snapshot::Snapshot;
pub use user::{Role, UserAccount};
