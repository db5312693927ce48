//! Offline support: connectivity tracking and the pending change queue.
//!
//! Mutations attempted while the client is offline are recorded as
//! [`PendingChange`]s. When connectivity returns, the queue is drained
//! through a [`ChangeSyncer`], retrying each failed change with
//! exponential backoff until it succeeds or exhausts its retry budget.

mod changes;
mod connectivity;
mod pending;
mod sync;

pub use changes::OfflineChanges;
pub use connectivity::Connectivity;
pub use pending::{ChangeAction, PendingChange, PendingQueue};
pub(crate) use sync::SyncDriver;
pub use sync::{ChangeSyncer, RetryPolicy, SyncEvent, SyncFuture, SyncSummary};
