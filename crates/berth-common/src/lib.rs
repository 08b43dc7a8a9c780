//! Shared models and collaborator contracts
//!
//! The data model (boxes, payloads, status values) plus the traits the
//! agent uses to reach the outside world: the message transport, the
//! remote status store and output sinks for deploy output.

pub mod error;
pub mod models;
pub mod sink;
pub mod status;
pub mod transport;

pub use error::Error;
pub use models::*;
pub use sink::{CollectingSink, NullSink, OutputSink};
pub use status::{HttpStatusStore, MemoryStatusStore, Status, StatusStore};
pub use transport::{MemoryTransport, MessageTransport};

pub type Result<T> = std::result::Result<T, Error>;
