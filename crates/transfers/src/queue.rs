//! Async completion queue
//!
//! Optional marshalling layer for runtimes that cannot accept callbacks on
//! the engine's event-processing thread. A notifier installs a callback
//! that snapshots the completed transfer into a [`CompletionEvent`] and
//! pushes it onto a bounded channel; the consumer drains the channel from
//! its own execution context. Direct synchronous dispatch through the
//! bridge remains the default; this trades immediacy for ordering safety.

use crate::engine::TransferHandle;
use crate::transfer::Transfer;
use async_channel::{Receiver, Sender, TrySendError, bounded};
use common::TransferStatus;
use tracing::warn;

/// Snapshot of one completed transfer
///
/// Taken inside the completion callback, so the fields are stable even if
/// the caller later resubmits or frees the transfer.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// Handle of the transfer that completed
    pub handle: TransferHandle,
    /// Terminal status, if the engine reported a known code
    pub status: Option<TransferStatus>,
    /// Copy of the received data (exactly the actual length)
    pub data: Vec<u8>,
}

/// Producer side: installs forwarding callbacks on transfers
#[derive(Clone)]
pub struct CompletionNotifier {
    tx: Sender<CompletionEvent>,
}

impl CompletionNotifier {
    /// Forward this transfer's completions onto the queue
    ///
    /// Replaces any previously set callback. The push never blocks the
    /// engine's event thread: when the queue is full the event is dropped
    /// and logged.
    pub fn attach(&self, transfer: &Transfer) {
        let tx = self.tx.clone();
        transfer.set_callback(move |t| {
            let event = CompletionEvent {
                handle: t.handle(),
                status: t.status(),
                data: t.get_data(),
            };
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(
                        "Completion queue full; dropping event for transfer {:#x}",
                        event.handle.addr()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    // Consumer gone; nothing left to notify.
                }
            }
        });
    }
}

/// Consumer side: drained from the caller's own context
pub struct CompletionReceiver {
    rx: Receiver<CompletionEvent>,
}

impl CompletionReceiver {
    /// Wait for the next completion
    pub async fn recv(&self) -> Option<CompletionEvent> {
        self.rx.recv().await.ok()
    }

    /// Take a completion if one is already queued
    pub fn try_recv(&self) -> Option<CompletionEvent> {
        self.rx.try_recv().ok()
    }

    /// Queued completions not yet consumed
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a bounded completion queue
///
/// Returns the notifier for the engine side and the receiver for the
/// consumer side.
pub fn completion_queue(capacity: usize) -> (CompletionNotifier, CompletionReceiver) {
    let (tx, rx) = bounded(capacity);
    (CompletionNotifier { tx }, CompletionReceiver { rx })
}
