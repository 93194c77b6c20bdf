pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod producer;
pub mod provision;
pub mod registry;

pub use context::{Backends, ProducerContext};
pub use error::{ProducerError, ProvisionError};
pub use handle::{DeliveryHandle, ProducerHandle};
pub use producer::Producer;
pub use provision::{ProvisionOutcome, TopicProvisioner};
pub use registry::TopicRegistry;
