//! Native transfer engine contract
//!
//! The asynchronous transfer engine (libusb in production, [`MockEngine`] in
//! tests) is consumed through this trait so the registry, record, and bridge
//! can be exercised with synthetic handles and no real hardware.
//!
//! [`MockEngine`]: crate::testing::MockEngine

/// Opaque identity of one native transfer descriptor
///
/// Wraps the descriptor's address. Only ever used as a lookup key; the core
/// never dereferences it, all reads of native memory go through
/// [`TransferEngine::descriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(usize);

impl TransferHandle {
    /// Wrap a raw descriptor address
    pub fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw descriptor address
    pub fn addr(&self) -> usize {
        self.0
    }
}

/// Opaque device/session identity
///
/// Obtained and released outside this crate (open/claim is device-management
/// territory); carried through to the engine unexamined. Holds no ownership
/// of the underlying device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// Snapshot of the native-populated descriptor fields
///
/// A bounds-checked copy taken at read time. The engine never hands out a
/// live reference into memory the native side may still be writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorFields {
    /// Transfer flag bits (see `common::status::flags`)
    pub flags: u8,
    /// Endpoint address, direction bit included
    pub endpoint: u8,
    /// Raw endpoint transfer type
    pub transfer_type: u8,
    /// Timeout in milliseconds (0 = unlimited)
    pub timeout_ms: u32,
    /// Raw terminal status code, meaningful after completion
    pub status: i32,
    /// Requested length in bytes
    pub length: i32,
    /// Bytes actually transferred
    pub actual_length: i32,
}

/// The native asynchronous transfer engine
///
/// Implementations own descriptor memory and scheduling. Completion
/// notifications arrive on the engine's own event-processing context and
/// must be forwarded to the [`CallbackBridge`] the engine was built with.
///
/// Engine calls may run concurrently with the completion path for the same
/// handle; the registry, not the engine, resolves that race.
///
/// [`CallbackBridge`]: crate::bridge::CallbackBridge
pub trait TransferEngine: Send + Sync {
    /// Allocate a descriptor sized for `iso_packets` isochronous packets
    /// (0 for bulk/control/interrupt). `None` when the engine is out of
    /// descriptors.
    fn alloc_transfer(&self, iso_packets: usize) -> Option<TransferHandle>;

    /// Release a descriptor. The handle is invalid afterwards.
    fn free_transfer(&self, handle: TransferHandle);

    /// Hand a filled descriptor to the engine. Returns the native status
    /// code, 0 on success. The completion callback may fire before this
    /// returns if the engine completes synchronously.
    fn submit_transfer(&self, handle: TransferHandle) -> i32;

    /// Ask the engine to abort an in-flight transfer. Returns the native
    /// status code, 0 on success. Advisory: the transfer may already have
    /// completed.
    fn cancel_transfer(&self, handle: TransferHandle) -> i32;

    /// Populate the descriptor for a bulk transfer and install the bridge
    /// as the completion notifier.
    ///
    /// `buffer` stays owned by the caller's record; the engine borrows it
    /// until the submission reaches a terminal state. `length` may be 0 for
    /// a zero-length packet, in which case `buffer` must not be
    /// dereferenced.
    fn fill_bulk_transfer(
        &self,
        handle: TransferHandle,
        device: DeviceHandle,
        endpoint: u8,
        buffer: *mut u8,
        length: i32,
        timeout_ms: u32,
    );

    /// Copy the descriptor fields out of native memory
    fn descriptor(&self, handle: TransferHandle) -> DescriptorFields;
}
