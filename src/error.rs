//! Error kinds for the outbound frame flusher, defined with `quick-error`.

use std::io;
use std::sync::Arc;

quick_error! {
    /// All the ways a submission, or the drain it was part of, can fail.
    ///
    /// A panicking user callback has no variant here: it is caught, logged
    /// and swallowed by the engine, and never reaches a submitter through
    /// this type.
    #[derive(Debug, Clone)]
    pub enum FlushError {
        /// Submitted after `close()`; end-of-stream.
        Closed {
            display("flusher is closed")
        }
        /// Submitted after the engine latched an earlier terminal error.
        Latched(cause: Box<FlushError>) {
            display("previous write failed: {}", cause)
        }
        /// The transport's gather write completed with an error.
        Write(err: Arc<io::Error>) {
            display("transport write failed: {}", err)
        }
        /// `BufferPool::acquire` could not satisfy a request; treated the
        /// same as a write failure by the engine.
        PoolExhausted {
            display("buffer pool exhausted")
        }
        /// The bounded queue (see `FlusherConfig::max_queue_len`) is full.
        QueueFull {
            display("submit queue at capacity")
        }
    }
}
