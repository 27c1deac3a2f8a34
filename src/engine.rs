//! The flush engine: an iterating-callback state machine that drains the
//! submit queue under a single logical writer, decides batch-vs-gather,
//! drives the transport, and completes callbacks.
//!
//! A producer that finds the engine already busy just flags more work and
//! returns instead of starting a second drain; the engine picks the flag
//! up at its next step boundary. This keeps exactly one write in flight
//! without holding a lock across it.

use std::io;
use std::io::IoSlice;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::callback::Completion;
use crate::error::FlushError;
use crate::frame::BatchHint;
use crate::generator::Generator;
use crate::pool::{BufferPool, PoolBuf};
use crate::queue::{Submission, SubmissionBody, SubmitQueue};
use crate::transport::{Transport, WriteCompletion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Processing,
    Pending,
    Failed,
}

struct EngineState {
    phase: Phase,
    /// The single live aggregate, if the engine is mid-batch. Never left
    /// non-empty across a transition to `Idle`.
    aggregate: Option<PoolBuf>,
    /// Set by a producer that kicked a busy engine; consulted only at the
    /// point the engine would otherwise go idle, so no wake-up is lost.
    kick_pending: bool,
}

/// The bytes (and the submissions that produced them) behind a single
/// in-flight transport write. Held in `Engine::in_flight` for exactly the
/// span between issuing the write and its completion.
struct WriteData {
    aggregate: Option<PoolBuf>,
    entries: Vec<Submission>,
}

impl WriteData {
    fn io_slices(&self) -> Vec<IoSlice<'_>> {
        let mut slices = Vec::new();
        if let Some(ref agg) = self.aggregate {
            if !agg.is_empty() {
                slices.push(IoSlice::new(agg.as_slice()));
            }
        }
        for entry in &self.entries {
            if let Some(ref header) = entry.header_buf {
                if !header.is_empty() {
                    slices.push(IoSlice::new(header.as_slice()));
                }
            }
            if let SubmissionBody::Frame(ref frame) = entry.body {
                if !frame.payload.is_empty() {
                    slices.push(IoSlice::new(frame.payload.as_slice()));
                }
            }
        }
        slices
    }
}

pub(crate) struct Engine {
    queue: Arc<SubmitQueue>,
    generator: Arc<dyn Generator>,
    pool: Arc<dyn BufferPool>,
    transport: Arc<dyn Transport>,
    buffer_size: usize,
    max_gather: usize,
    state: Mutex<EngineState>,
    in_flight: Mutex<Option<WriteData>>,
}

impl Engine {
    pub(crate) fn new(
        queue: Arc<SubmitQueue>,
        generator: Arc<dyn Generator>,
        pool: Arc<dyn BufferPool>,
        transport: Arc<dyn Transport>,
        buffer_size: usize,
        max_gather: usize,
    ) -> Arc<Engine> {
        Arc::new(Engine {
            queue,
            generator,
            pool,
            transport,
            buffer_size,
            max_gather,
            state: Mutex::new(EngineState { phase: Phase::Idle, aggregate: None, kick_pending: false }),
            in_flight: Mutex::new(None),
        })
    }

    /// Called by a producer right after a successful `submit`. Starts a
    /// drain if the engine was idle; otherwise just marks work pending.
    /// The in-flight step picks it up at its next boundary (see `step`).
    pub(crate) fn kick(self: &Arc<Self>) {
        let should_start = {
            let mut state = self.state.lock().unwrap();
            match state.phase {
                Phase::Idle => {
                    state.phase = Phase::Processing;
                    true
                }
                Phase::Failed => false,
                _ => {
                    state.kick_pending = true;
                    false
                }
            }
        };
        if should_start {
            self.step();
        }
    }

    fn step(self: &Arc<Self>) {
        loop {
            let aggregate_len = self.state.lock().unwrap().aggregate.as_ref().map_or(0, |agg| agg.len());
            let (slice, batch) = self.queue.drain_slice(
                self.max_gather,
                self.generator.max_header_len(),
                self.buffer_size,
                aggregate_len,
            );

            if slice.is_empty() {
                let mut state = self.state.lock().unwrap();
                if let Some(agg) = state.aggregate.take() {
                    drop(state);
                    self.flush_direct(Vec::new(), Some(agg));
                    return;
                }
                if state.kick_pending {
                    state.kick_pending = false;
                    drop(state);
                    continue;
                }
                state.phase = Phase::Idle;
                return;
            }

            if batch == BatchHint::Off {
                let existing = {
                    let mut state = self.state.lock().unwrap();
                    state.aggregate.take()
                };
                self.flush_direct(slice, existing);
                return;
            }

            if !self.batch_into_aggregate(slice) {
                return;
            }
        }
    }

    /// Writes each entry's header and payload straight into the shared
    /// aggregate, completes their callbacks synthetically (no transport
    /// write issued), and reports whether the caller should keep draining.
    fn batch_into_aggregate(self: &Arc<Self>, slice: Vec<Submission>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.aggregate.is_none() {
            match self.pool.acquire(self.buffer_size, false) {
                Ok(buf) => state.aggregate = Some(buf),
                Err(err) => {
                    drop(state);
                    self.fail_with(err, WriteData { aggregate: None, entries: slice });
                    return false;
                }
            }
        }
        {
            let agg = state.aggregate.as_mut().expect("aggregate just acquired");
            for sub in &slice {
                if let SubmissionBody::Frame(ref frame) = sub.body {
                    self.generator.render_header_into(frame, agg);
                    agg.extend_from_slice(frame.payload.as_slice());
                }
            }
        }
        drop(state);
        for sub in slice {
            Self::notify_success(sub.completion);
        }
        true
    }

    /// Renders standalone headers for `slice`, issues a gather write of
    /// the (optional) leftover aggregate followed by each entry's header
    /// and original payload buffer, and transitions to `Pending`.
    fn flush_direct(self: &Arc<Self>, slice: Vec<Submission>, existing_aggregate: Option<PoolBuf>) {
        let mut entries = Vec::with_capacity(slice.len());
        let mut acquire_err = None;
        for mut sub in slice {
            if acquire_err.is_none() {
                if let SubmissionBody::Frame(ref frame) = sub.body {
                    if sub.header_buf.is_none() {
                        match self.generator.render_header(frame, &*self.pool) {
                            Ok(hb) => sub.header_buf = Some(hb),
                            Err(err) => acquire_err = Some(err),
                        }
                    }
                }
            }
            entries.push(sub);
        }

        if let Some(err) = acquire_err {
            self.fail_with(err, WriteData { aggregate: existing_aggregate, entries });
            return;
        }

        let data = WriteData { aggregate: existing_aggregate, entries };
        let mut slot = self.in_flight.lock().unwrap();
        debug_assert!(slot.is_none(), "single-writer invariant violated");
        *slot = Some(data);
        let io_slices = slot.as_ref().expect("just inserted").io_slices();

        {
            let mut state = self.state.lock().unwrap();
            state.phase = Phase::Pending;
        }

        if io_slices.is_empty() {
            // Nothing to write (e.g. a bare sentinel with no leftover
            // aggregate). Complete immediately without touching the
            // transport, matching "the sentinel produces no bytes".
            drop(slot);
            self.on_write_complete(Ok(()));
            return;
        }

        self.transport.write(&io_slices, Box::new(EngineCompletion { engine: Arc::clone(self) }));
        // `slot`'s guard drops here; the data stays behind the mutex until
        // `on_write_complete` takes it back out.
    }

    fn on_write_complete(self: &Arc<Self>, result: Result<(), io::Error>) {
        let data = {
            let mut slot = self.in_flight.lock().unwrap();
            slot.take().expect("write completion fired with no write in flight")
        };
        match result {
            Ok(()) => {
                if let Some(agg) = data.aggregate {
                    self.pool.release(agg);
                }
                for entry in data.entries {
                    if let Some(hb) = entry.header_buf {
                        self.pool.release(hb);
                    }
                    Self::notify_success(entry.completion);
                }
                {
                    let mut state = self.state.lock().unwrap();
                    state.phase = Phase::Processing;
                }
                self.step();
            }
            Err(io_err) => {
                self.fail_with(FlushError::Write(Arc::new(io_err)), data);
            }
        }
    }

    /// Latches `err`, fails every callback in `data` plus everything still
    /// queued, and transitions to the terminal `Failed` phase. The first
    /// terminal error wins; this function only ever runs once per engine
    /// (subsequent submits observe the latch via `SubmitQueue::submit`).
    fn fail_with(self: &Arc<Self>, err: FlushError, data: WriteData) {
        self.queue.latch_failure(err.clone());
        if let Some(agg) = data.aggregate {
            self.pool.release(agg);
        }
        for entry in data.entries {
            if let Some(hb) = entry.header_buf {
                self.pool.release(hb);
            }
            Self::notify_failure(entry.completion, err.clone());
        }
        for entry in self.queue.take_all() {
            if let Some(hb) = entry.header_buf {
                self.pool.release(hb);
            }
            Self::notify_failure(entry.completion, err.clone());
        }
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::Failed;
        state.aggregate = None;
    }

    /// `close()`'s engine-facing half: entries already snapshotted out of
    /// the queue are failed with `Closed` here. If no write is currently
    /// in flight the engine settles back to `Idle` (nothing left to do);
    /// if one is in flight, its own completion decides that slice's
    /// outcome. Does not force it to fail.
    pub(crate) fn close(self: &Arc<Self>, drained: Vec<Submission>) {
        for entry in drained {
            if let Some(hb) = entry.header_buf {
                self.pool.release(hb);
            }
            Self::notify_failure(entry.completion, FlushError::Closed);
        }
        let mut state = self.state.lock().unwrap();
        if state.phase == Phase::Idle {
            if let Some(agg) = state.aggregate.take() {
                drop(state);
                self.pool.release(agg);
            }
        }
    }

    pub(crate) fn notify_success(completion: Box<dyn Completion>) {
        if panic::catch_unwind(AssertUnwindSafe(|| completion.succeeded())).is_err() {
            error!("submit callback panicked in succeeded()");
        }
    }

    pub(crate) fn notify_failure(completion: Box<dyn Completion>, err: FlushError) {
        if panic::catch_unwind(AssertUnwindSafe(move || completion.failed(err))).is_err() {
            error!("submit callback panicked in failed()");
        }
    }
}

struct EngineCompletion {
    engine: Arc<Engine>,
}

impl WriteCompletion for EngineCompletion {
    fn done(self: Box<Self>, result: Result<(), io::Error>) {
        self.engine.on_write_complete(result);
    }
}
