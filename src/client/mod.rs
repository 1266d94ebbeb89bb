//! Client side of the chat stream: transports and the consumer state machine.

pub mod consumer;
pub mod events;
pub mod transport;

pub use consumer::{ConsumerState, PendingAction, StreamConsumer, StreamConsumerBuilder};
pub use events::ClientEvent;
pub use transport::{ByteStream, ChatTransport, HttpTransport, USER_ID_HEADER};
