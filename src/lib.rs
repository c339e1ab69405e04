pub mod config;
pub mod error;
pub mod events;
pub mod humanize;
pub mod observability;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod transfer;
pub mod transport;

pub use error::{DescriptorError, TransferError, TransportError, TransportErrorKind};
pub use events::{ChannelSink, EventSink, ProgressValue, TransferEvent, TracingSink};
pub use orchestrator::{Batch, BatchOutcome, FailureKind, Orchestrator, TransferOutcome};
pub use retry::{RetryError, RetryPolicy};
pub use transfer::{TerminalResult, TransferDescriptor, TransferStatus, TransferUnit};
pub use transport::{HttpConfig, HttpTransport, Transport, TransportResponse};
