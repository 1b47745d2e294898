//! Test utilities for the transfer layer
//!
//! Provides [`MockEngine`], a synthetic-handle implementation of
//! [`TransferEngine`] that lets the registry, record, bridge, and manager be
//! exercised without hardware or a real native context. Completion helpers
//! play the role of the engine's event-processing thread: they populate the
//! descriptor fields, write into the buffer captured at fill time, and
//! invoke the bridge.

use crate::bridge::CallbackBridge;
use crate::engine::{DescriptorFields, DeviceHandle, TransferEngine, TransferHandle};
use crate::manager::TransferManager;
use common::TransferStatus;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

/// A synthetic descriptor, standing in for native transfer memory
#[derive(Debug, Default, Clone)]
struct MockDescriptor {
    fields: DescriptorFields,
    device: Option<DeviceHandle>,
    /// Buffer pointer captured at fill time, stored as an address so the
    /// descriptor table stays `Send`. Valid while the owning record lives.
    buffer_addr: usize,
    buffer_capacity: usize,
    iso_packets: usize,
    submissions: u32,
}

/// Synthetic transfer engine for tests
///
/// Handles are counter-derived, not addresses; the core treats them as
/// opaque either way. Failure modes are switchable per test: allocation
/// failure, submit/cancel return codes, and synchronous completion during
/// submit (the "callback fires before submit returns" edge).
pub struct MockEngine {
    bridge: CallbackBridge,
    descriptors: Mutex<HashMap<usize, MockDescriptor>>,
    next_handle: AtomicUsize,
    fail_allocation: AtomicBool,
    submit_result: AtomicI32,
    cancel_result: AtomicI32,
    complete_on_submit: Mutex<Option<(TransferStatus, Vec<u8>)>>,
}

impl MockEngine {
    /// Create a mock engine notifying `bridge` on completions
    pub fn new(bridge: CallbackBridge) -> Self {
        Self {
            bridge,
            descriptors: Mutex::new(HashMap::new()),
            next_handle: AtomicUsize::new(1),
            fail_allocation: AtomicBool::new(false),
            submit_result: AtomicI32::new(0),
            cancel_result: AtomicI32::new(0),
            complete_on_submit: Mutex::new(None),
        }
    }

    /// Make subsequent allocations return no descriptor
    pub fn fail_allocation(&self, fail: bool) {
        self.fail_allocation.store(fail, Ordering::SeqCst);
    }

    /// Native code returned by subsequent submits (0 = success)
    pub fn set_submit_result(&self, code: i32) {
        self.submit_result.store(code, Ordering::SeqCst);
    }

    /// Native code returned by subsequent cancels (0 = success)
    pub fn set_cancel_result(&self, code: i32) {
        self.cancel_result.store(code, Ordering::SeqCst);
    }

    /// Complete transfers synchronously inside `submit_transfer`
    ///
    /// Models an engine that finishes the transfer within the submit call
    /// itself, so the callback fires before submit returns to the caller.
    pub fn complete_during_submit(&self, status: TransferStatus, data: Vec<u8>) {
        *self
            .complete_on_submit
            .lock()
            .expect("mock config lock poisoned") = Some((status, data));
    }

    /// Deliver a completion, as the engine's event thread would
    ///
    /// Writes `data` into the buffer captured at fill time (clamped to its
    /// capacity), records status and actual length, then invokes the
    /// bridge. Returns the number of bytes written.
    pub fn complete(&self, handle: TransferHandle, status: TransferStatus, data: &[u8]) -> usize {
        let written = {
            let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
            let Some(descriptor) = descriptors.get_mut(&handle.addr()) else {
                // Freed or never allocated; a real engine would be reading
                // freed memory here. Deliver the notification anyway so the
                // bridge's drop path can be exercised.
                drop(descriptors);
                self.bridge.handle_completion(handle);
                return 0;
            };

            let n = data.len().min(descriptor.buffer_capacity);
            if n > 0 {
                // SAFETY: buffer_addr/buffer_capacity were captured from
                // the record's owned buffer at fill time, and the record is
                // kept alive by its registry entry for the duration of the
                // simulated flight.
                unsafe {
                    std::ptr::copy_nonoverlapping(data.as_ptr(), descriptor.buffer_addr as *mut u8, n);
                }
            }
            descriptor.fields.status = status as i32;
            descriptor.fields.actual_length = n as i32;
            n
        };

        // Lock released before dispatch: the callback may call back into
        // descriptor accessors.
        self.bridge.handle_completion(handle);
        written
    }

    /// Deliver a completion that transferred no data (cancel, timeout, ...)
    pub fn complete_empty(&self, handle: TransferHandle, status: TransferStatus) {
        self.complete(handle, status, &[]);
    }

    /// Overwrite the reported actual length without delivering a completion
    pub fn set_actual_length(&self, handle: TransferHandle, actual_length: i32) {
        let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        if let Some(descriptor) = descriptors.get_mut(&handle.addr()) {
            descriptor.fields.actual_length = actual_length;
        }
    }

    /// How many times the handle has been submitted
    pub fn submissions(&self, handle: TransferHandle) -> u32 {
        let descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors
            .get(&handle.addr())
            .map(|d| d.submissions)
            .unwrap_or(0)
    }

    /// Whether the descriptor is still allocated
    pub fn is_allocated(&self, handle: TransferHandle) -> bool {
        let descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors.contains_key(&handle.addr())
    }

    /// Isochronous packet count the descriptor was allocated for
    pub fn iso_packets(&self, handle: TransferHandle) -> usize {
        let descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors
            .get(&handle.addr())
            .map(|d| d.iso_packets)
            .unwrap_or(0)
    }

    /// Device handle the descriptor was filled with, if any
    pub fn filled_device(&self, handle: TransferHandle) -> Option<DeviceHandle> {
        let descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors.get(&handle.addr()).and_then(|d| d.device)
    }
}

impl TransferEngine for MockEngine {
    fn alloc_transfer(&self, iso_packets: usize) -> Option<TransferHandle> {
        if self.fail_allocation.load(Ordering::SeqCst) {
            return None;
        }
        let addr = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors.insert(
            addr,
            MockDescriptor {
                iso_packets,
                ..MockDescriptor::default()
            },
        );
        Some(TransferHandle::from_addr(addr))
    }

    fn free_transfer(&self, handle: TransferHandle) {
        let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors.remove(&handle.addr());
    }

    fn submit_transfer(&self, handle: TransferHandle) -> i32 {
        let code = self.submit_result.load(Ordering::SeqCst);
        if code != 0 {
            return code;
        }

        {
            let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
            let Some(descriptor) = descriptors.get_mut(&handle.addr()) else {
                return -1;
            };
            descriptor.submissions += 1;
        }

        let synchronous = self
            .complete_on_submit
            .lock()
            .expect("mock config lock poisoned")
            .clone();
        if let Some((status, data)) = synchronous {
            self.complete(handle, status, &data);
        }
        0
    }

    fn cancel_transfer(&self, _handle: TransferHandle) -> i32 {
        self.cancel_result.load(Ordering::SeqCst)
    }

    fn fill_bulk_transfer(
        &self,
        handle: TransferHandle,
        device: DeviceHandle,
        endpoint: u8,
        buffer: *mut u8,
        length: i32,
        timeout_ms: u32,
    ) {
        let mut descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        if let Some(descriptor) = descriptors.get_mut(&handle.addr()) {
            descriptor.device = Some(device);
            descriptor.buffer_addr = buffer as usize;
            descriptor.buffer_capacity = length.max(0) as usize;
            descriptor.fields = DescriptorFields {
                flags: 0,
                endpoint,
                transfer_type: common::TransferType::Bulk as u8,
                timeout_ms,
                status: 0,
                length,
                actual_length: 0,
            };
        }
    }

    fn descriptor(&self, handle: TransferHandle) -> DescriptorFields {
        let descriptors = self.descriptors.lock().expect("mock table lock poisoned");
        descriptors
            .get(&handle.addr())
            .map(|d| d.fields)
            .unwrap_or_default()
    }
}

/// A manager wired to a fresh [`MockEngine`]
pub fn mock_manager() -> TransferManager<MockEngine> {
    TransferManager::new(MockEngine::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_handles_are_unique() {
        let manager = mock_manager();
        let a = manager.alloc_transfer(0).unwrap();
        let b = manager.alloc_transfer(0).unwrap();

        assert_ne!(a.handle(), b.handle());
        a.free();
        b.free();
    }

    #[test]
    fn test_fill_records_device_and_iso_count() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(4).unwrap();
        assert_eq!(manager.engine().iso_packets(transfer.handle()), 4);
        assert_eq!(manager.engine().filled_device(transfer.handle()), None);

        transfer
            .fill_bulk(DeviceHandle(9), 0x02, vec![0u8; 2], 100)
            .unwrap();
        assert_eq!(
            manager.engine().filled_device(transfer.handle()),
            Some(DeviceHandle(9))
        );
        transfer.free();
    }

    #[test]
    fn test_free_releases_descriptor() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();
        let handle = transfer.handle();

        assert!(manager.engine().is_allocated(handle));
        transfer.free();
        assert!(!manager.engine().is_allocated(handle));
    }

    #[test]
    fn test_completion_for_freed_descriptor_is_safe() {
        let manager = mock_manager();
        let transfer = manager.alloc_transfer(0).unwrap();
        let handle = transfer.handle();
        transfer.free();

        // No registry entry, no descriptor: bridge drops it
        assert_eq!(
            manager
                .engine()
                .complete(handle, TransferStatus::Completed, b"data"),
            0
        );
    }
}
