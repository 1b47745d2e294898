//! libusb-backed transfer engine
//!
//! Implements [`TransferEngine`] over the raw libusb asynchronous transfer
//! API (`rusb::ffi`, the libusb1-sys re-export). The safe rusb surface does
//! not expose `libusb_submit_transfer` and friends, so descriptor
//! population is done on the raw `libusb_transfer` struct directly.
//!
//! The engine stores its [`CallbackBridge`] on the heap and plants that
//! address in every descriptor's `user_data`; the C-callable trampoline
//! recovers it and forwards the transfer's address as the handle. The
//! bridge pointer stays valid for as long as any transfer record exists,
//! because every record keeps the engine alive through its `Arc`.
//!
//! Event processing (`libusb_handle_events`) is the caller's job, typically
//! from a dedicated worker thread driving the rusb context.

use crate::bridge::CallbackBridge;
use crate::engine::{DescriptorFields, DeviceHandle, TransferEngine, TransferHandle};
use rusb::ffi;
use std::os::raw::{c_int, c_void};
use tracing::error;

/// Transfer engine backed by libusb's async API
pub struct LibusbEngine {
    /// Boxed for a stable address: descriptors carry a raw pointer to it.
    bridge: Box<CallbackBridge>,
}

impl LibusbEngine {
    /// Create an engine notifying `bridge` on completions
    pub fn new(bridge: CallbackBridge) -> Self {
        Self {
            bridge: Box::new(bridge),
        }
    }
}

/// Wrap an open rusb device handle for fill operations
///
/// The returned handle borrows nothing: keeping the device open while
/// transfers are in flight is the caller's responsibility.
pub fn device_handle<T: rusb::UsbContext>(handle: &rusb::DeviceHandle<T>) -> DeviceHandle {
    DeviceHandle(handle.as_raw() as usize)
}

/// The completion notifier libusb invokes on its event-processing thread
///
/// Terminal states of every kind (completed, error, timed out, cancelled,
/// stalled, no-device, overflow) arrive here.
extern "system" fn transfer_callback(transfer: *mut ffi::libusb_transfer) {
    // SAFETY: libusb only invokes this for descriptors we filled, and we
    // always plant the engine's bridge address in user_data.
    let bridge = unsafe { (*transfer).user_data as *const CallbackBridge };
    if bridge.is_null() {
        return;
    }
    let handle = TransferHandle::from_addr(transfer as usize);

    // A panic must not unwind into libusb's event loop.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        // SAFETY: the bridge outlives every in-flight transfer (see module
        // docs); the pointer is valid for the duration of this call.
        unsafe { (*bridge).handle_completion(handle) }
    }));
    if let Err(e) = result {
        error!("Panic in transfer completion callback: {:?}", e);
    }
}

impl TransferEngine for LibusbEngine {
    fn alloc_transfer(&self, iso_packets: usize) -> Option<TransferHandle> {
        // SAFETY: plain allocation call; a null return means out of memory.
        let ptr = unsafe { ffi::libusb_alloc_transfer(iso_packets as c_int) };
        if ptr.is_null() {
            None
        } else {
            Some(TransferHandle::from_addr(ptr as usize))
        }
    }

    fn free_transfer(&self, handle: TransferHandle) {
        // SAFETY: the handle came from alloc_transfer and the API layer
        // guarantees free is not issued twice for one allocation.
        unsafe { ffi::libusb_free_transfer(handle.addr() as *mut ffi::libusb_transfer) }
    }

    fn submit_transfer(&self, handle: TransferHandle) -> i32 {
        // SAFETY: descriptor was populated by fill_bulk_transfer and is
        // still allocated.
        unsafe { ffi::libusb_submit_transfer(handle.addr() as *mut ffi::libusb_transfer) }
    }

    fn cancel_transfer(&self, handle: TransferHandle) -> i32 {
        // SAFETY: cancelling a descriptor that is not in flight is a benign
        // libusb error (NOT_FOUND), surfaced as the return code.
        unsafe { ffi::libusb_cancel_transfer(handle.addr() as *mut ffi::libusb_transfer) }
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
        let transfer = handle.addr() as *mut ffi::libusb_transfer;
        // SAFETY: the descriptor is allocated and not in flight (fill is
        // only reachable on a registered, unsubmitted record). The buffer
        // pointer is owned by the record and stays valid until the
        // completion callback returns; with length 0 libusb never
        // dereferences it.
        unsafe {
            (*transfer).dev_handle = device.0 as *mut ffi::libusb_device_handle;
            (*transfer).endpoint = endpoint;
            (*transfer).transfer_type = ffi::constants::LIBUSB_TRANSFER_TYPE_BULK;
            (*transfer).timeout = timeout_ms;
            (*transfer).buffer = buffer;
            (*transfer).length = length;
            (*transfer).callback = transfer_callback;
            (*transfer).user_data = &*self.bridge as *const CallbackBridge as *mut c_void;
        }
    }

    fn descriptor(&self, handle: TransferHandle) -> DescriptorFields {
        let transfer = handle.addr() as *const ffi::libusb_transfer;
        // SAFETY: field-by-field copy out of an allocated descriptor; the
        // API layer never exposes a record past free. libusb writes status
        // and actual_length before invoking the callback, so reads from the
        // callback or after it see settled values.
        unsafe {
            DescriptorFields {
                flags: (*transfer).flags,
                endpoint: (*transfer).endpoint,
                transfer_type: (*transfer).transfer_type,
                timeout_ms: (*transfer).timeout,
                status: (*transfer).status,
                length: (*transfer).length,
                actual_length: (*transfer).actual_length,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TransferManager;

    // Descriptor allocation and field population need no device or USB
    // context, so this much can run anywhere libusb is linked.

    #[test]
    fn test_alloc_fill_free_round_trip() {
        let manager = TransferManager::new(LibusbEngine::new);
        let transfer = manager.alloc_transfer(0).unwrap();

        transfer
            .fill_bulk(DeviceHandle(0), 0x81, vec![0u8; 16], 2500)
            .unwrap();

        assert_eq!(transfer.endpoint(), 0x81);
        assert_eq!(transfer.length(), 16);
        assert_eq!(transfer.timeout_ms(), 2500);
        assert_eq!(
            transfer.transfer_type(),
            Some(common::TransferType::Bulk)
        );
        assert_eq!(transfer.actual_length(), 0);

        transfer.free();
        assert!(manager.registry().is_empty());
    }

    #[test]
    fn test_iso_allocation() {
        let manager = TransferManager::new(LibusbEngine::new);
        let transfer = manager.alloc_transfer(8).unwrap();
        transfer.free();
    }
}
