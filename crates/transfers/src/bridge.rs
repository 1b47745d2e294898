//! Callback bridge
//!
//! The single entry point the native engine invokes when a submitted
//! transfer reaches a terminal state (completed, error, timed out,
//! cancelled, stalled, no-device, overflow). It runs synchronously on
//! whatever thread drives the engine's event processing; the core does not
//! hop it elsewhere. Callers whose runtime cannot take arbitrary-thread
//! callbacks can marshal through [`crate::queue`] instead.

use crate::engine::TransferHandle;
use crate::registry::TransferRegistry;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolves native completion notifications to managed records
///
/// Clonable; clones share the same registry. Engines receive one at
/// construction and must forward every terminal notification to
/// [`handle_completion`](Self::handle_completion).
#[derive(Clone)]
pub struct CallbackBridge {
    registry: Arc<TransferRegistry>,
}

impl CallbackBridge {
    pub(crate) fn new(registry: Arc<TransferRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a completion notification
    ///
    /// A handle with no registry entry was cancelled and reaped by the
    /// caller while the notification was in flight; dropping it here is the
    /// designed resolution of that race, not an error. The bridge never
    /// removes registry entries itself: state transitions belong to the
    /// explicit cancel/free operations.
    pub fn handle_completion(&self, handle: TransferHandle) {
        let Some(transfer) = self.registry.lookup(handle) else {
            trace!(
                "Dropping completion for unregistered transfer {:#x} (cancelled in progress)",
                handle.addr()
            );
            return;
        };

        // Clone the callback out of its lock before invoking, so the
        // callback itself may replace it or touch the record's setters.
        match transfer.callback() {
            Some(callback) => callback(&transfer),
            None => {
                debug!(
                    "Transfer {:#x} completed with no callback set; dropping notification",
                    handle.addr()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_handle_is_dropped() {
        let registry = Arc::new(TransferRegistry::new());
        let bridge = CallbackBridge::new(registry);

        // Must neither panic nor dispatch
        bridge.handle_completion(TransferHandle::from_addr(0xbeef));
    }
}
