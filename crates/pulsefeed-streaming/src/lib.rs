//! pulsefeed streaming transport.
//!
//! - [`EventSource`]: capability to open one push connection at a time
//! - [`SseEventSource`]: server-sent events over HTTP (reqwest)
//! - [`ChannelEventSource`]: in-memory source for driving consumers in tests
//! - [`SseDecoder`]: incremental `text/event-stream` parser

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
mod error;
pub mod source;
pub mod sse;

pub use channel::{ChannelConnection, ChannelEventSource};
pub use error::{StreamError, StreamResult};
pub use source::{EventSource, SseConfig, SseEventSource, StreamEvent, StreamHandle};
pub use sse::{SseDecoder, SseFrame, SseItem};
