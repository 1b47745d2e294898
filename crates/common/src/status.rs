//! Transfer status, flag, and type constant tables
//!
//! Numeric values are identical to libusb's so that raw descriptor fields
//! map without translation. The tables stay engine-agnostic: a mock engine
//! reports the same codes a real libusb context would.

/// Terminal status of a submitted transfer
///
/// Reported by the native engine through the completion path once a
/// submission cycle ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TransferStatus {
    /// Transfer completed without error
    ///
    /// Note that this does not imply the full requested length was
    /// transferred; check the actual length.
    Completed = 0,
    /// Transfer failed
    Error = 1,
    /// Transfer timed out
    TimedOut = 2,
    /// Transfer was cancelled
    Cancelled = 3,
    /// Endpoint stalled (halt condition)
    Stall = 4,
    /// Device was disconnected
    NoDevice = 5,
    /// Device sent more data than requested
    Overflow = 6,
}

impl TransferStatus {
    /// Map a raw native status code to a status, if it is one we know
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Completed),
            1 => Some(Self::Error),
            2 => Some(Self::TimedOut),
            3 => Some(Self::Cancelled),
            4 => Some(Self::Stall),
            5 => Some(Self::NoDevice),
            6 => Some(Self::Overflow),
            _ => None,
        }
    }

    /// Canonical upper-snake name, matching the native constant
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "TRANSFER_COMPLETED",
            Self::Error => "TRANSFER_ERROR",
            Self::TimedOut => "TRANSFER_TIMED_OUT",
            Self::Cancelled => "TRANSFER_CANCELLED",
            Self::Stall => "TRANSFER_STALL",
            Self::NoDevice => "TRANSFER_NO_DEVICE",
            Self::Overflow => "TRANSFER_OVERFLOW",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer flag bits
///
/// Set on the native descriptor; surfaced read-only through the record's
/// accessors.
pub mod flags {
    /// Report an error if less data than requested arrives
    pub const TRANSFER_SHORT_NOT_OK: u8 = 1 << 0;
    /// Engine frees the buffer when freeing the descriptor
    pub const TRANSFER_FREE_BUFFER: u8 = 1 << 1;
    /// Engine frees the descriptor after the completion callback returns
    pub const TRANSFER_FREE_TRANSFER: u8 = 1 << 2;
    /// Terminate an OUT transfer that is a multiple of the packet size
    /// with an extra zero-length packet
    pub const TRANSFER_ADD_ZERO_PACKET: u8 = 1 << 3;
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferType {
    /// Control endpoint
    Control = 0,
    /// Isochronous endpoint
    Isochronous = 1,
    /// Bulk endpoint
    Bulk = 2,
    /// Interrupt endpoint
    Interrupt = 3,
    /// Bulk endpoint with stream ID
    BulkStream = 4,
}

impl TransferType {
    /// Map a raw native type code
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Control),
            1 => Some(Self::Isochronous),
            2 => Some(Self::Bulk),
            3 => Some(Self::Interrupt),
            4 => Some(Self::BulkStream),
            _ => None,
        }
    }
}
