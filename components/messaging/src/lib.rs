//! Point-to-point messaging between page and worker contexts.
//!
//! Every cross-context operation of the mocker is layered on a single
//! primitive: [`send_request`] allocates a fresh [`MessageChannel`], posts a
//! [`Message`] to a [`MessageTarget`] with one end of the channel attached,
//! and waits for exactly one reply on the other end.
//!
//! # Overview
//!
//! - [`Message`] / [`Action`] - The `{ action, ...payload }` envelope
//! - [`MessageChannel`] / [`MessagePort`] - Transferable port pairs
//! - [`MessageTarget`] - Anything a message can be posted to
//! - [`send_request`] / [`post`] - Request/reply and fire-and-forget sends
//! - [`EventBus`] - Context-wide listener multiplexing
//! - [`ExecutionContext`] / [`ClientId`] - Context kind and client identity

pub mod action;
pub mod channel;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod message;
pub mod request;
pub mod target;

pub use action::Action;
pub use channel::{MessageChannel, MessagePort, PortSender};
pub use context::{ClientId, ExecutionContext};
pub use error::MessagingError;
pub use event_bus::{BusEvent, EventBus, EventType, ListenerId};
pub use message::{Message, MessageEvent};
pub use request::{post, send_request, Timeout, DEFAULT_TIMEOUT};
pub use target::{Delivery, MessageTarget};
