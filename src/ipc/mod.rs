//! IPC module
//!
//! Line protocol between clients and the assistant: request/reply frames, the
//! pending-request registry and the TCP/stdio transports.

pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{Reply, ReplyStatus, StructuredRequest};
pub use registry::{PendingRegistry, PendingRequest};
