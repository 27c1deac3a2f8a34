//! The public façade: wires the generator, pool, transport and submit
//! queue together behind the two operations callers actually need,
//! `submit` and `close`.

use std::sync::Arc;

use crate::callback::Completion;
use crate::engine::Engine;
use crate::frame::{BatchHint, Frame};
use crate::generator::Generator;
use crate::pool::BufferPool;
use crate::queue::{Submission, SubmissionBody, SubmitQueue};
use crate::transport::Transport;

/// Construction-time tunables: the aggregate capacity (also the implicit
/// large-frame threshold divisor, `buffer_size / 4`) and the maximum
/// number of entries drained per engine step.
#[derive(Debug, Clone, Copy)]
pub struct FlusherConfig {
    pub buffer_size: usize,
    pub max_gather: usize,
    /// `None` (the default) means unbounded, no built-in back-pressure.
    /// Set this to make over-bound submissions fail deterministically
    /// with `FlushError::QueueFull` instead.
    pub max_queue_len: Option<usize>,
}

impl Default for FlusherConfig {
    fn default() -> FlusherConfig {
        FlusherConfig { buffer_size: 4096, max_gather: 16, max_queue_len: None }
    }
}

/// The single-writer, batching outbound frame flusher.
///
/// Cloning a `Flusher` is cheap and shares the same underlying queue and
/// engine. This is the expected way to hand a submit handle to multiple
/// producer threads/tasks.
#[derive(Clone)]
pub struct Flusher {
    queue: Arc<SubmitQueue>,
    engine: Arc<Engine>,
}

impl Flusher {
    pub fn new(
        generator: Arc<dyn Generator>,
        pool: Arc<dyn BufferPool>,
        transport: Arc<dyn Transport>,
        config: FlusherConfig,
    ) -> Flusher {
        let queue = Arc::new(SubmitQueue::new(config.max_queue_len));
        let engine = Engine::new(
            Arc::clone(&queue),
            generator,
            pool,
            transport,
            config.buffer_size,
            config.max_gather,
        );
        Flusher { queue, engine }
    }

    /// Non-blocking: either enqueues `frame` and kicks the engine, or
    /// fails `completion` synchronously with the reason (closed, a
    /// latched failure, or a full bounded queue).
    pub fn submit(&self, frame: Frame, completion: Box<dyn Completion>, hint: BatchHint) {
        let sub = Submission { body: SubmissionBody::Frame(frame), hint, completion, header_buf: None };
        self.enqueue(sub);
    }

    /// Forces a flush of whatever is currently aggregated. Produces no
    /// bytes of its own; `completion` fires once the prior aggregated
    /// bytes (if any) have been written.
    pub fn flush_sentinel(&self, completion: Box<dyn Completion>) {
        let sub = Submission {
            body: SubmissionBody::FlushSentinel,
            hint: BatchHint::Off,
            completion,
            header_buf: None,
        };
        self.enqueue(sub);
    }

    fn enqueue(&self, sub: Submission) {
        match self.queue.submit(sub) {
            Ok(()) => self.engine.kick(),
            Err((sub, err)) => Engine::notify_failure(sub.completion, err),
        }
    }

    /// Idempotent. Flips the flusher to a terminal closed state: every
    /// subsequent `submit`/`flush_sentinel` fails synchronously with
    /// `FlushError::Closed`, and everything still queued at the moment of
    /// the call fails the same way. A write already in flight is allowed
    /// to complete normally (see `Engine::close`).
    pub fn close(&self) {
        let drained = self.queue.close();
        self.engine.close(drained);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::io::IoSlice;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::callback::FnCompletion;
    use crate::frame::Frame;
    use crate::generator::StdGenerator;
    use crate::pool::HeapPool;
    use crate::transport::WriteCompletion;

    /// Records writes and holds their completions until `settle` fires
    /// them. Never completes from within `write` itself.
    struct InlineTransport {
        writes: Mutex<usize>,
        pending: Mutex<Vec<Box<dyn WriteCompletion>>>,
    }

    impl InlineTransport {
        fn new() -> Arc<InlineTransport> {
            Arc::new(InlineTransport { writes: Mutex::new(0), pending: Mutex::new(Vec::new()) })
        }

        fn settle(&self) {
            let batch: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
            for completion in batch {
                completion.done(Ok(()));
            }
        }
    }

    impl Transport for InlineTransport {
        fn write(&self, _buffers: &[IoSlice], completion: Box<dyn WriteCompletion>) {
            *self.writes.lock().unwrap() += 1;
            self.pending.lock().unwrap().push(completion);
        }
    }

    fn flusher_with(transport: Arc<InlineTransport>) -> Flusher {
        Flusher::new(Arc::new(StdGenerator), Arc::new(HeapPool), transport, FlusherConfig::default())
    }

    fn completion(ok: &Arc<Mutex<Vec<bool>>>) -> Box<dyn Completion> {
        let s = Arc::clone(ok);
        let f = Arc::clone(ok);
        Box::new(FnCompletion::new(move || s.lock().unwrap().push(true), move |_| f.lock().unwrap().push(false)))
    }

    #[test]
    fn submit_through_the_public_api_succeeds() {
        let transport = InlineTransport::new();
        let flusher = flusher_with(Arc::clone(&transport));
        let results = Arc::new(Mutex::new(Vec::new()));

        flusher.submit(Frame::binary(vec![1, 2, 3]), completion(&results), BatchHint::Auto);
        transport.settle();

        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert_eq!(*transport.writes.lock().unwrap(), 1);
    }

    #[test]
    fn close_fails_queued_work_and_rejects_further_submits() {
        let transport = InlineTransport::new();
        let flusher = flusher_with(transport);
        let results = Arc::new(Mutex::new(Vec::new()));

        flusher.close();
        flusher.submit(Frame::binary(vec![9]), completion(&results), BatchHint::Auto);

        assert_eq!(*results.lock().unwrap(), vec![false]);
    }

    #[test]
    fn flush_sentinel_produces_no_bytes_of_its_own() {
        let transport = InlineTransport::new();
        let flusher = flusher_with(Arc::clone(&transport));

        let results = Arc::new(Mutex::new(Vec::new()));
        flusher.flush_sentinel(completion(&results));
        transport.settle();

        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert_eq!(*transport.writes.lock().unwrap(), 0);
    }

    #[test]
    fn cloned_flusher_shares_the_same_queue_and_engine() {
        let transport = InlineTransport::new();
        let flusher = flusher_with(Arc::clone(&transport));
        let handle = flusher.clone();
        let results = Arc::new(Mutex::new(Vec::new()));

        handle.submit(Frame::text(Vec::from("hi".as_bytes())), completion(&results), BatchHint::Auto);
        transport.settle();

        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert_eq!(*transport.writes.lock().unwrap(), 1);
    }

    #[test]
    fn unwritable_io_error_surfaces_as_write_failure() {
        /// Same deferred-completion discipline as `InlineTransport`, just
        /// failing every write it records.
        struct FailingTransport {
            pending: Mutex<Vec<Box<dyn WriteCompletion>>>,
        }
        impl Transport for FailingTransport {
            fn write(&self, _buffers: &[IoSlice], completion: Box<dyn WriteCompletion>) {
                self.pending.lock().unwrap().push(completion);
            }
        }
        let transport = Arc::new(FailingTransport { pending: Mutex::new(Vec::new()) });
        let flusher = Flusher::new(
            Arc::new(StdGenerator),
            Arc::new(HeapPool),
            Arc::clone(&transport) as Arc<dyn Transport>,
            FlusherConfig::default(),
        );
        let results = Arc::new(Mutex::new(Vec::new()));

        flusher.submit(Frame::binary(vec![0u8; 4000]), completion(&results), BatchHint::Auto);
        for completion in transport.pending.lock().unwrap().drain(..) {
            completion.done(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
        }

        assert_eq!(*results.lock().unwrap(), vec![false]);
    }
}
