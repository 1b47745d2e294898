//! Shared types for usb-async
//!
//! This crate provides the pieces shared by every consumer of the async
//! transfer layer: the transfer status and flag constant tables (numerically
//! identical to libusb's), the error taxonomy, and logging setup.

pub mod error;
pub mod logging;
pub mod status;

pub use error::{Result, TransferError};
pub use logging::setup_logging;
pub use status::{TransferStatus, TransferType};
