//! Managed transfer record
//!
//! One [`Transfer`] corresponds to exactly one native descriptor for its
//! registered lifetime. The record owns the data buffer; the native engine
//! borrows it between submit and completion. Native-populated result fields
//! (status, actual length, ...) are read through the engine's snapshot
//! accessor, never as live references into foreign memory.
//!
//! Lifecycle: `Allocated → Filled → Submitted → {Completed, Cancelled,
//! Freed}`, with `Freed` terminal and reachable from any state. Allocation
//! goes through [`TransferManager::alloc_transfer`], which registers the
//! record before returning it; the remaining operations live here, on the
//! record itself.
//!
//! [`TransferManager::alloc_transfer`]: crate::manager::TransferManager::alloc_transfer

use crate::engine::{DeviceHandle, TransferEngine, TransferHandle};
use crate::registry::TransferRegistry;
use common::{Result, TransferError, TransferStatus, TransferType};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// User completion callback, invoked on the engine's event-processing thread
pub type TransferCallback = Arc<dyn Fn(&Transfer) + Send + Sync>;

/// Opaque user payload carried through unexamined
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Managed record for one asynchronous transfer
///
/// Cheap to clone; clones share the same underlying record (the registry
/// holds one for the bridge's lookups). After [`free`](Self::free), no clone
/// may be used again: the native descriptor is gone and reading its fields
/// is undefined. That discipline is the caller's responsibility, exactly
/// once per allocation.
#[derive(Clone)]
pub struct Transfer {
    inner: Arc<TransferInner>,
}

struct TransferInner {
    handle: TransferHandle,
    engine: Arc<dyn TransferEngine>,
    registry: Arc<TransferRegistry>,
    device: Mutex<Option<DeviceHandle>>,
    callback: Mutex<Option<TransferCallback>>,
    user_data: Mutex<Option<UserData>>,
    /// Owned storage shared with the engine while a submission is in
    /// flight. Must not be replaced during that window.
    buffer: Mutex<Vec<u8>>,
    freed: AtomicBool,
}

impl Transfer {
    pub(crate) fn new(
        handle: TransferHandle,
        engine: Arc<dyn TransferEngine>,
        registry: Arc<TransferRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(TransferInner {
                handle,
                engine,
                registry,
                device: Mutex::new(None),
                callback: Mutex::new(None),
                user_data: Mutex::new(None),
                buffer: Mutex::new(Vec::new()),
                freed: AtomicBool::new(false),
            }),
        }
    }

    /// The native handle this record represents
    pub fn handle(&self) -> TransferHandle {
        self.inner.handle
    }

    /// Device handle supplied at fill time
    pub fn device(&self) -> Option<DeviceHandle> {
        *self.inner.device.lock().expect("device lock poisoned")
    }

    /// Replace the completion callback
    ///
    /// Must not race with an outstanding submission's completion; set it
    /// before submitting.
    pub fn set_callback(&self, callback: impl Fn(&Transfer) + Send + Sync + 'static) {
        let mut slot = self.inner.callback.lock().expect("callback lock poisoned");
        *slot = Some(Arc::new(callback));
    }

    /// Remove the completion callback
    pub fn clear_callback(&self) {
        let mut slot = self.inner.callback.lock().expect("callback lock poisoned");
        *slot = None;
    }

    /// The current completion callback, if any
    pub fn callback(&self) -> Option<TransferCallback> {
        self.inner
            .callback
            .lock()
            .expect("callback lock poisoned")
            .clone()
    }

    /// Attach an opaque user payload
    pub fn set_user_data(&self, data: UserData) {
        let mut slot = self.inner.user_data.lock().expect("user data lock poisoned");
        *slot = Some(data);
    }

    /// The attached user payload, if any
    pub fn user_data(&self) -> Option<UserData> {
        self.inner
            .user_data
            .lock()
            .expect("user data lock poisoned")
            .clone()
    }

    // Native-populated fields, read as a bounds-checked snapshot.

    /// Transfer flag bits
    pub fn flags(&self) -> u8 {
        self.inner.engine.descriptor(self.inner.handle).flags
    }

    /// Endpoint address, direction bit included
    pub fn endpoint(&self) -> u8 {
        self.inner.engine.descriptor(self.inner.handle).endpoint
    }

    /// Endpoint transfer type, if the raw code is known
    pub fn transfer_type(&self) -> Option<TransferType> {
        TransferType::from_raw(self.inner.engine.descriptor(self.inner.handle).transfer_type)
    }

    /// Timeout in milliseconds (0 = unlimited)
    pub fn timeout_ms(&self) -> u32 {
        self.inner.engine.descriptor(self.inner.handle).timeout_ms
    }

    /// Terminal status, meaningful once a completion has been delivered
    pub fn status(&self) -> Option<TransferStatus> {
        TransferStatus::from_raw(self.inner.engine.descriptor(self.inner.handle).status)
    }

    /// Requested length in bytes
    pub fn length(&self) -> i32 {
        self.inner.engine.descriptor(self.inner.handle).length
    }

    /// Bytes actually transferred
    pub fn actual_length(&self) -> i32 {
        self.inner.engine.descriptor(self.inner.handle).actual_length
    }

    /// Copy out the received data
    ///
    /// Returns exactly `actual_length` bytes, clamped to the owned buffer's
    /// capacity. Empty when nothing was transferred.
    pub fn get_data(&self) -> Vec<u8> {
        let buffer = self.inner.buffer.lock().expect("buffer lock poisoned");
        let actual = self.actual_length().max(0) as usize;
        buffer[..actual.min(buffer.len())].to_vec()
    }

    /// Populate the descriptor for a bulk transfer
    ///
    /// Stores `data` as the record's owned buffer and installs the callback
    /// bridge as the native-level completion notifier. The user callback is
    /// never handed to the engine directly.
    ///
    /// Zero-length buffers are accepted; they submit as zero-length packets
    /// and the engine never dereferences the pointer.
    ///
    /// Fails with [`TransferError::NotRegistered`] if the record is no
    /// longer in the registry (never allocated through the manager, or
    /// already cancelled/freed).
    pub fn fill_bulk(
        &self,
        device: DeviceHandle,
        endpoint: u8,
        data: Vec<u8>,
        timeout_ms: u32,
    ) -> Result<()> {
        if !self.inner.registry.contains(self.inner.handle) {
            return Err(TransferError::NotRegistered);
        }

        *self.inner.device.lock().expect("device lock poisoned") = Some(device);

        let mut buffer = self.inner.buffer.lock().expect("buffer lock poisoned");
        *buffer = data;
        let length = i32::try_from(buffer.len()).unwrap_or(i32::MAX);

        debug!(
            "Filling bulk transfer: handle={:#x}, endpoint={:#04x}, length={}, timeout={}ms",
            self.inner.handle.addr(),
            endpoint,
            length,
            timeout_ms
        );

        self.inner.engine.fill_bulk_transfer(
            self.inner.handle,
            device,
            endpoint,
            buffer.as_mut_ptr(),
            length,
            timeout_ms,
        );

        Ok(())
    }

    /// Hand the filled descriptor to the engine
    ///
    /// On a non-zero native return the record stays registered in `Filled`
    /// state; the caller may retry or free. The completion callback may fire
    /// before this returns if the engine completes synchronously.
    pub fn submit(&self) -> Result<()> {
        let rc = self.inner.engine.submit_transfer(self.inner.handle);
        if rc != 0 {
            warn!(
                "Transfer submission rejected: handle={:#x}, code={}",
                self.inner.handle.addr(),
                rc
            );
            return Err(TransferError::SubmissionFailed(rc));
        }
        Ok(())
    }

    /// Abort an in-flight transfer
    ///
    /// De-registers the record first, then issues the native cancel. Once
    /// this returns, a racing completion notification for this handle finds
    /// no registry entry and is dropped, so the user callback can no longer
    /// fire. That guarantee holds even when the native cancel itself fails:
    /// the record stays de-registered and [`TransferError::CancelFailed`]
    /// carries the native code.
    ///
    /// The descriptor itself is still allocated; finish with
    /// [`free`](Self::free).
    pub fn cancel(&self) -> Result<()> {
        // Ordering matters: de-register before the native call so the
        // bridge's lookup miss is deterministic from here on.
        self.inner.registry.remove(self.inner.handle);

        let rc = self.inner.engine.cancel_transfer(self.inner.handle);
        if rc != 0 {
            debug!(
                "Native cancel failed: handle={:#x}, code={} (transfer stays de-registered)",
                self.inner.handle.addr(),
                rc
            );
            return Err(TransferError::CancelFailed(rc));
        }
        Ok(())
    }

    /// De-register and release the native descriptor
    ///
    /// De-registration is idempotent (cancel may already have removed the
    /// entry); the native free is not. Call exactly once per allocation and
    /// drop all clones afterwards.
    pub fn free(self) {
        self.inner.registry.remove(self.inner.handle);
        self.inner.engine.free_transfer(self.inner.handle);
        self.inner.freed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("handle", &self.inner.handle)
            .field("device", &self.device())
            .finish_non_exhaustive()
    }
}

impl Drop for TransferInner {
    fn drop(&mut self) {
        // Last clone gone without an explicit free: the native descriptor
        // can no longer be released.
        if !self.freed.load(Ordering::Acquire) {
            warn!(
                "Transfer {:#x} dropped without free(); native descriptor leaked",
                self.handle.addr()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_manager;

    #[test]
    fn test_fill_requires_registration() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();

        // Cancel de-registers; a later fill must be refused.
        transfer.cancel().unwrap();
        let err = transfer
            .fill_bulk(DeviceHandle(1), 0x01, vec![0u8; 8], 1000)
            .unwrap_err();
        assert_eq!(err, TransferError::NotRegistered);

        transfer.free();
    }

    #[test]
    fn test_fill_accepts_empty_buffer() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();

        // Zero-length packet: valid bulk OUT traffic
        transfer
            .fill_bulk(DeviceHandle(1), 0x01, Vec::new(), 1000)
            .unwrap();
        assert_eq!(transfer.length(), 0);
        assert_eq!(transfer.get_data(), Vec::<u8>::new());

        transfer.free();
    }

    #[test]
    fn test_get_data_never_exceeds_buffer() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();
        transfer
            .fill_bulk(DeviceHandle(1), 0x81, vec![0u8; 4], 1000)
            .unwrap();

        // Engine claims more than the buffer holds; copy must clamp.
        manager
            .engine()
            .set_actual_length(transfer.handle(), 64);
        assert_eq!(transfer.get_data().len(), 4);

        // And a zero actual length yields an empty copy.
        manager.engine().set_actual_length(transfer.handle(), 0);
        assert!(transfer.get_data().is_empty());

        transfer.free();
    }

    #[test]
    fn test_user_data_round_trip() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();

        transfer.set_user_data(Arc::new(42u32));
        let data = transfer.user_data().unwrap();
        assert_eq!(data.downcast_ref::<u32>(), Some(&42));

        transfer.free();
    }

    #[test]
    fn test_callback_replace_and_clear() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();

        assert!(transfer.callback().is_none());
        transfer.set_callback(|_| {});
        assert!(transfer.callback().is_some());
        transfer.clear_callback();
        assert!(transfer.callback().is_none());

        transfer.free();
    }
}
