pub mod error;
pub mod ledger;
pub mod notifications;
pub mod orchestrator;
pub mod policy;
pub mod store;

pub use error::BookingError;
pub use ledger::{RefundEntry, RefundLedger, RefundState};
pub use notifications::{EmailMessage, LogMailTransport, MailTransport, NotificationCenter, OutboxMailTransport};
pub use orchestrator::{BookingRequest, BulkCancellationReport, CancellationOrchestrator, RemoteSync};
pub use policy::{
    evaluate_cancellation, CancellationOutcome, CancellationPolicy, RefundDecision, RefundResult,
    DEFAULT_SERVICE_FEE,
};
pub use store::{BookingStore, SortOrder, StoreError};
