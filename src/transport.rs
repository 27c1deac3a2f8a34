//! The downstream capability the flusher drives: a gather-write transport
//! with exactly one completion per write. No wire format or socket type
//! is assumed here; that's left to the caller.

use std::io;
use std::io::IoSlice;

/// Reports the outcome of a single `Transport::write` call.
pub trait WriteCompletion: Send {
    fn done(self: Box<Self>, result: Result<(), io::Error>);
}

/// A byte-oriented sink capable of a single logical gather write.
///
/// # Contract
///
/// - All of `buffers` are written, in order, as one logical write.
/// - Exactly one `completion.done(..)` call is made per `write` call.
/// - `write` itself must return promptly; it must not block waiting for
///   the write to complete, and it must not call `completion.done` before
///   returning. Completion always happens on a later call (possibly from
///   the calling thread, but never reentrantly from within `write`).
pub trait Transport: Send + Sync {
    fn write(&self, buffers: &[IoSlice], completion: Box<dyn WriteCompletion>);
}
