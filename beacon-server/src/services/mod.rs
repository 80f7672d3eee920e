//! Delivery services: stores, the channel registry, and push dispatch.
pub mod directory;
pub mod dispatcher;
pub mod message_store;
pub mod messaging;
pub mod notification_store;
pub mod postgres;
pub mod registry;
pub mod stream_supervisor;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use message_store::{StoreError, StoreResult};
pub use messaging::MessagingService;
pub use registry::{ChannelRegistry, InMemoryChannelRegistry, UnregisterOutcome};
pub use stream_supervisor::{StreamHandle, StreamSupervisor};
