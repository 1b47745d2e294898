//! Transfer manager
//!
//! Wires the registry, the callback bridge, and an engine together and owns
//! the allocation path. Everything past allocation (fill, submit, cancel,
//! free) lives on [`Transfer`] itself.

use crate::bridge::CallbackBridge;
use crate::engine::TransferEngine;
use crate::registry::TransferRegistry;
use crate::transfer::Transfer;
use common::{Result, TransferError};
use std::sync::Arc;
use tracing::{debug, error};

/// Allocation entry point for managed transfers
///
/// Generic over the engine so the whole layer runs against synthetic
/// handles in tests. The registry is an explicit component here, not
/// ambient global state.
pub struct TransferManager<E: TransferEngine> {
    engine: Arc<E>,
    registry: Arc<TransferRegistry>,
}

impl<E: TransferEngine + 'static> TransferManager<E> {
    /// Build a manager around an engine
    ///
    /// The engine is constructed last so it can capture the bridge it must
    /// notify on completions:
    ///
    /// ```ignore
    /// let manager = TransferManager::new(LibusbEngine::new);
    /// ```
    pub fn new(build_engine: impl FnOnce(CallbackBridge) -> E) -> Self {
        let registry = Arc::new(TransferRegistry::new());
        let bridge = CallbackBridge::new(Arc::clone(&registry));
        let engine = Arc::new(build_engine(bridge));
        Self { engine, registry }
    }

    /// Allocate a transfer descriptor and its managed record
    ///
    /// `iso_packets` sizes the descriptor for isochronous traffic; pass 0
    /// for bulk, control, or interrupt transfers.
    ///
    /// The record is registered before this returns: neither the caller nor
    /// a racing completion can ever observe an allocated-but-unregistered
    /// transfer. Fails with [`TransferError::AllocationFailed`] when the
    /// engine returns no descriptor, leaving the registry untouched.
    pub fn alloc_transfer(&self, iso_packets: usize) -> Result<Transfer> {
        let handle = self
            .engine
            .alloc_transfer(iso_packets)
            .ok_or(TransferError::AllocationFailed)?;

        let transfer = Transfer::new(
            handle,
            Arc::clone(&self.engine) as Arc<dyn TransferEngine>,
            Arc::clone(&self.registry),
        );

        if let Err(e) = self.registry.add(handle, transfer.clone()) {
            // The engine handed out a live handle twice; surface the defect
            // but do not leak the fresh descriptor.
            error!("Engine returned an already-registered handle {:#x}", handle.addr());
            self.engine.free_transfer(handle);
            return Err(e);
        }

        debug!("Allocated transfer {:#x} ({} iso packets)", handle.addr(), iso_packets);
        Ok(transfer)
    }

    /// The shared registry (bridge lookups and tests)
    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}
