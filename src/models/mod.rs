pub mod message;

pub use message::{Message, MessageKey, NewMessageRequest, UpdateMessageRequest};
