//! Transfer registry
//!
//! The process-wide correspondence table between native transfer handles and
//! their managed records. Sole source of truth for "does this handle still
//! have a live managed counterpart": the callback bridge drops any
//! notification whose handle is absent here, which is how the
//! cancel-versus-completion race is resolved.

use crate::engine::TransferHandle;
use crate::transfer::Transfer;
use common::{Result, TransferError};
use std::collections::HashMap;
use std::sync::Mutex;

/// Concurrent map from native transfer handle to managed record
///
/// All operations take the lock for a short map mutation only; none block
/// indefinitely. Callable from any caller thread and from the engine's
/// event-processing thread simultaneously.
pub struct TransferRegistry {
    inner: Mutex<HashMap<TransferHandle, Transfer>>,
}

impl TransferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a record under its handle
    ///
    /// Fails with [`TransferError::DuplicateHandle`] if the handle is
    /// already present. The allocation path makes that impossible under
    /// correct use; the check guards against an engine handing out a live
    /// handle twice.
    pub fn add(&self, handle: TransferHandle, transfer: Transfer) -> Result<()> {
        let mut map = self.inner.lock().expect("registry lock poisoned");
        if map.contains_key(&handle) {
            return Err(TransferError::DuplicateHandle);
        }
        map.insert(handle, transfer);
        Ok(())
    }

    /// De-register a handle
    ///
    /// Idempotent: removing an absent key is a no-op, because cancellation
    /// and free may race to remove the same entry.
    pub fn remove(&self, handle: TransferHandle) {
        let mut map = self.inner.lock().expect("registry lock poisoned");
        map.remove(&handle);
    }

    /// Resolve a handle to its record, if still registered
    pub fn lookup(&self, handle: TransferHandle) -> Option<Transfer> {
        let map = self.inner.lock().expect("registry lock poisoned");
        map.get(&handle).cloned()
    }

    /// Whether the handle has a live managed counterpart
    pub fn contains(&self, handle: TransferHandle) -> bool {
        let map = self.inner.lock().expect("registry lock poisoned");
        map.contains_key(&handle)
    }

    /// Number of registered transfers
    pub fn len(&self) -> usize {
        let map = self.inner.lock().expect("registry lock poisoned");
        map.len()
    }

    /// Whether no transfers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_manager;

    #[test]
    fn test_add_lookup_remove() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();
        let handle = transfer.handle();
        let registry = manager.registry();

        assert!(registry.contains(handle));
        assert_eq!(registry.lookup(handle).unwrap().handle(), handle);

        registry.remove(handle);
        assert!(!registry.contains(handle));
        assert!(registry.lookup(handle).is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = TransferRegistry::new();
        let handle = TransferHandle::from_addr(0xdead);

        // Absent key: no-op, no panic
        registry.remove(handle);
        registry.remove(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();
        let registry = manager.registry();

        let err = registry
            .add(transfer.handle(), transfer.clone())
            .unwrap_err();
        assert_eq!(err, TransferError::DuplicateHandle);
        // Original entry intact
        assert_eq!(registry.len(), 1);
        transfer.free();
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let registry = Arc::new(TransferRegistry::new());
        let manager = mock_manager();

        let mut threads = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let transfer = manager.alloc_transfer(0).unwrap();
            threads.push(std::thread::spawn(move || {
                let handle = transfer.handle();
                registry.add(handle, transfer).unwrap();
                assert!(registry.contains(handle));
                registry.remove(handle);
                registry.remove(handle);
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
