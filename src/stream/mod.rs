//! Session streams: a [`Session`](crate::session::Session) bound to a frame
//! transport, exposed as listener callbacks and an outbound sink.

pub mod client;
mod driver;
pub mod listener;
pub mod server;
pub mod sink;
pub mod waiter;

pub use client::{Connected, StreamSessionClient};
pub use listener::{SessionEvent, SessionListener};
pub use server::StreamSessionServer;
pub use sink::{OutboundSink, SessionHandle};
pub use waiter::{waiting_listener, SessionWaiter, WaitingListener};
