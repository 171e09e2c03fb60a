//! Callback interface to the bound value consumer
//!
//! A leaf binding notifies its consumer when the leaf's update queue
//! transitions from empty to non-empty, or when an out-of-band event
//! arrives. Consumers are expected to drain the queue in response; they are
//! not re-notified per queued element.

use opcbridge_core::ProcessReason;

/// Downstream consumer bound to one leaf element
///
/// `notify` is called while the leaf's write lock is held by the caller:
/// it must be cheap, must not block, and must not re-enter the binding
/// tree. The usual implementation posts to a work queue.
pub trait ValueConsumer: Send + Sync {
    fn notify(&self, reason: ProcessReason);
}
