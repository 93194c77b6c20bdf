use std::future::Future;
use std::pin::Pin;

use crate::error::BackendError;
use crate::record::{DeliveryReport, OutboundRecord};

/// Resolves once the broker acknowledged (or rejected) one record.
pub type DeliveryFuture =
    Pin<Box<dyn Future<Output = Result<DeliveryReport, BackendError>> + Send + 'static>>;

/// Publishing side of a broker connection.
///
/// `send` only enqueues: an `Err` means the record never left the client,
/// while broker-side failures surface through the returned future.
pub trait RecordSink: Send + Sync {
    fn send(&self, record: OutboundRecord) -> Result<DeliveryFuture, BackendError>;

    /// Push out everything buffered so far.
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>>;

    /// Release the connection. Called once by the owning handle.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
