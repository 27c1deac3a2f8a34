//! A single-writer, batching outbound WebSocket frame flusher.
//!
//! This crate implements the hardest part of a WebSocket connection's
//! write side: taking application-submitted frames, turning them into
//! on-the-wire byte sequences, and handing them to a byte-oriented
//! transport while guaranteeing
//!
//! - at most one concurrent write to the transport,
//! - frame ordering with a PING-priority exception,
//! - zero-copy of large payloads, and
//! - exactly-once callback completion (success, failure, or cancellation
//!   on close) for every submitted frame.
//!
//! The surrounding machinery (the HTTP upgrade handshake, incoming-frame
//! parsing, idle timeouts, application-message encoding, fragmentation) is
//! out of scope; this crate meets its caller through two seams:
//! [`Flusher::submit`] upstream, and the [`transport::Transport`]
//! capability downstream.
//!
//! # Example
//!
//! ```no_run
//! use std::io;
//! use std::io::IoSlice;
//! use std::sync::Arc;
//!
//! use tk_ws_flush::{BatchHint, Completion, Flusher, FlusherConfig, Frame, FlushError};
//! use tk_ws_flush::generator::StdGenerator;
//! use tk_ws_flush::pool::CachingPool;
//! use tk_ws_flush::transport::{Transport, WriteCompletion};
//!
//! struct LoggingCompletion;
//! impl Completion for LoggingCompletion {
//!     fn succeeded(self: Box<Self>) {}
//!     fn failed(self: Box<Self>, _err: FlushError) {}
//! }
//!
//! struct StdoutTransport;
//! impl Transport for StdoutTransport {
//!     fn write(&self, _buffers: &[IoSlice], completion: Box<dyn WriteCompletion>) {
//!         // Real transports complete asynchronously; a thread hop is the
//!         // simplest way to honor that even for a toy synchronous sink.
//!         std::thread::spawn(move || completion.done(Ok(())));
//!     }
//! }
//!
//! let flusher = Flusher::new(
//!     Arc::new(StdGenerator),
//!     Arc::new(CachingPool::new()),
//!     Arc::new(StdoutTransport),
//!     FlusherConfig::default(),
//! );
//! flusher.submit(Frame::text(Vec::from("hi".as_bytes())), Box::new(LoggingCompletion), BatchHint::Auto);
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;
extern crate byteorder;
extern crate rand;

mod callback;
mod engine;
mod error;
mod flusher;
mod frame;
pub mod generator;
pub mod pool;
mod queue;
pub mod transport;

pub use crate::callback::{Completion, FnCompletion};
pub use crate::error::FlushError;
pub use crate::flusher::{Flusher, FlusherConfig};
pub use crate::frame::{BatchHint, Frame, OpCode, Payload};
