//! Asynchronous USB transfer layer
//!
//! Correspondence layer between a native asynchronous transfer engine
//! (libusb in production) and managed transfer records. Each native
//! descriptor is paired with exactly one [`Transfer`] for its registered
//! lifetime; a concurrent [`TransferRegistry`] is the sole source of truth
//! for that pairing, and the [`CallbackBridge`] resolves completion
//! notifications through it.
//!
//! The registry ordering rules close the cancellation race: records are
//! registered before allocation returns, and de-registered before a native
//! cancel or free is issued. A completion notification that arrives for a
//! de-registered handle is dropped, never dispatched into torn-down state.
//!
//! # Example
//!
//! ```no_run
//! use transfers::{LibusbEngine, TransferManager};
//!
//! # fn main() -> common::Result<()> {
//! let manager = TransferManager::new(LibusbEngine::new);
//!
//! let transfer = manager.alloc_transfer(0)?;
//! transfer.set_callback(|t| {
//!     println!("transfer {:?} finished: {:?}", t.handle(), t.status());
//! });
//! # let device = transfers::DeviceHandle(0);
//! transfer.fill_bulk(device, 0x81, vec![0u8; 64], 1000)?;
//! transfer.submit()?;
//! // ... drive libusb event processing, then:
//! transfer.free();
//! # Ok(())
//! # }
//! ```
//!
//! Completion callbacks run on the engine's event-processing thread. Use
//! [`queue::completion_queue`] to marshal completions onto an async
//! consumer instead.

pub mod bridge;
pub mod engine;
pub mod libusb;
pub mod manager;
pub mod queue;
pub mod registry;
pub mod testing;
pub mod transfer;

pub use bridge::CallbackBridge;
pub use engine::{DescriptorFields, DeviceHandle, TransferEngine, TransferHandle};
pub use libusb::LibusbEngine;
pub use manager::TransferManager;
pub use queue::{CompletionEvent, CompletionNotifier, CompletionReceiver, completion_queue};
pub use registry::TransferRegistry;
pub use transfer::{Transfer, TransferCallback, UserData};
