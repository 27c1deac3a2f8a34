//! The submit queue: a mutex-protected deque with PING priority, a
//! monotonic closed flag, and a latched failure. The closed flag and the
//! failure live inside the same mutex as the deque so a submission
//! observes all three atomically.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::callback::Completion;
use crate::error::FlushError;
use crate::frame::{BatchHint, Frame, OpCode};
use crate::pool::PoolBuf;

/// What a submission carries down the pipe: an actual frame, or the
/// sentinel used to force a flush of whatever is currently aggregated.
pub(crate) enum SubmissionBody {
    Frame(Frame),
    FlushSentinel,
}

/// An entry owned by the flush engine while it's queued or being drained.
pub(crate) struct Submission {
    pub(crate) body: SubmissionBody,
    pub(crate) hint: BatchHint,
    pub(crate) completion: Box<dyn Completion>,
    /// Populated only once the engine has chosen to render this entry's
    /// header into a standalone buffer for a gather write, rather than
    /// into the aggregate.
    pub(crate) header_buf: Option<PoolBuf>,
}

impl Submission {
    pub(crate) fn is_ping(&self) -> bool {
        matches!(&self.body, SubmissionBody::Frame(f) if f.opcode == OpCode::Ping)
    }

    pub(crate) fn is_close(&self) -> bool {
        matches!(&self.body, SubmissionBody::Frame(f) if f.opcode == OpCode::Close)
    }

    pub(crate) fn is_sentinel(&self) -> bool {
        matches!(&self.body, SubmissionBody::FlushSentinel)
    }

    /// `max_header + payload.len()`, the approximate on-wire size used to
    /// force a slice to bypass the aggregate.
    pub(crate) fn approx_wire_len(&self, max_header: usize) -> usize {
        match &self.body {
            SubmissionBody::Frame(f) => max_header + f.payload.len(),
            SubmissionBody::FlushSentinel => 0,
        }
    }
}

struct State {
    deque: VecDeque<Submission>,
    closed: bool,
    failure: Option<FlushError>,
}

pub(crate) struct SubmitQueue {
    state: Mutex<State>,
    max_len: Option<usize>,
}

impl SubmitQueue {
    pub(crate) fn new(max_len: Option<usize>) -> SubmitQueue {
        SubmitQueue {
            state: Mutex::new(State { deque: VecDeque::new(), closed: false, failure: None }),
            max_len,
        }
    }

    /// Enqueues `sub` according to priority, or hands it back with the
    /// error it should be failed with.
    pub(crate) fn submit(&self, sub: Submission) -> Result<(), (Submission, FlushError)> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err((sub, FlushError::Closed));
        }
        if let Some(ref failure) = state.failure {
            return Err((sub, FlushError::Latched(Box::new(failure.clone()))));
        }
        if let Some(max) = self.max_len {
            if state.deque.len() >= max {
                return Err((sub, FlushError::QueueFull));
            }
        }
        if sub.is_ping() {
            state.deque.push_front(sub);
        } else {
            let closes = sub.is_close();
            state.deque.push_back(sub);
            if closes {
                state.closed = true;
            }
        }
        Ok(())
    }

    /// Atomically drains up to `max` entries, computing the batch
    /// decision for the slice as it goes: starts at `Auto` and is forced
    /// down to `Off` the first time any entry's own hint is `Off`, the
    /// entry is the sentinel, the entry's approximate wire size exceeds a
    /// quarter of `buffer_size`, or the running aggregate budget would go
    /// non-positive. `aggregate_len` seeds that budget with the bytes
    /// already sitting in the aggregate from an earlier drain this run.
    pub(crate) fn drain_slice(
        &self,
        max: usize,
        max_header: usize,
        buffer_size: usize,
        aggregate_len: usize,
    ) -> (Vec<Submission>, BatchHint) {
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::new();
        let mut batch = BatchHint::Auto;
        let mut remaining = buffer_size as i64 - aggregate_len as i64;

        while out.len() < max {
            if state.deque.is_empty() {
                break;
            }
            let sub = state.deque.pop_front().unwrap();
            let wire = sub.approx_wire_len(max_header) as i64;
            let forces_off = sub.hint == BatchHint::Off
                || sub.is_sentinel()
                || wire > (buffer_size as i64) / 4
                || (remaining - wire) <= 0;
            if forces_off {
                batch = BatchHint::Off;
            } else {
                remaining -= wire;
            }
            out.push(sub);
        }
        (out, batch)
    }

    /// Flips `closed`, snapshots and clears the queue, returning what was
    /// still waiting so the caller can fail each one outside the mutex.
    pub(crate) fn close(&self) -> Vec<Submission> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.deque.drain(..).collect()
    }

    /// Latches `err` as the queue's failure if none is latched yet.
    /// Returns whether this call won the latch.
    pub(crate) fn latch_failure(&self, err: FlushError) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.failure.is_none() {
            state.failure = Some(err);
            true
        } else {
            false
        }
    }

    /// Drains everything currently queued, e.g. to fail it after a latch.
    pub(crate) fn take_all(&self) -> Vec<Submission> {
        let mut state = self.state.lock().unwrap();
        state.deque.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::FnCompletion;
    use crate::frame::Frame;

    fn dummy_submission(body: SubmissionBody, hint: BatchHint) -> Submission {
        Submission {
            body,
            hint,
            completion: Box::new(FnCompletion::new(|| {}, |_| {})),
            header_buf: None,
        }
    }

    #[test]
    fn ping_jumps_the_queue() {
        let q = SubmitQueue::new(None);
        q.submit(dummy_submission(SubmissionBody::Frame(Frame::binary(vec![1])), BatchHint::Auto))
            .unwrap();
        q.submit(dummy_submission(SubmissionBody::Frame(Frame::binary(vec![2])), BatchHint::Auto))
            .unwrap();
        q.submit(dummy_submission(SubmissionBody::Frame(Frame::ping(Vec::new())), BatchHint::Auto))
            .unwrap();

        let (slice, _) = q.drain_slice(8, 14, 4096, 0);
        assert_eq!(slice.len(), 3);
        assert!(slice[0].is_ping());
    }

    #[test]
    fn close_flips_closed_and_fails_subsequent_submits() {
        let q = SubmitQueue::new(None);
        q.submit(dummy_submission(SubmissionBody::Frame(Frame::close(1000, "bye")), BatchHint::Off))
            .unwrap();
        let err = q
            .submit(dummy_submission(SubmissionBody::Frame(Frame::binary(vec![1])), BatchHint::Auto))
            .unwrap_err();
        assert!(matches!(err.1, FlushError::Closed));
    }

    #[test]
    fn large_payload_forces_batch_off() {
        let q = SubmitQueue::new(None);
        q.submit(dummy_submission(
            SubmissionBody::Frame(Frame::binary(vec![0u8; 2000])),
            BatchHint::Auto,
        ))
        .unwrap();
        let (_slice, batch) = q.drain_slice(8, 14, 4096, 0);
        assert_eq!(batch, BatchHint::Off);
    }

    #[test]
    fn small_auto_frames_stay_batched() {
        let q = SubmitQueue::new(None);
        for _ in 0..4 {
            q.submit(dummy_submission(
                SubmissionBody::Frame(Frame::binary(vec![0u8; 64])),
                BatchHint::Auto,
            ))
            .unwrap();
        }
        let (slice, batch) = q.drain_slice(8, 14, 4096, 0);
        assert_eq!(slice.len(), 4);
        assert_eq!(batch, BatchHint::Auto);
    }

    #[test]
    fn nonzero_aggregate_len_shrinks_the_remaining_budget() {
        let q = SubmitQueue::new(None);
        q.submit(dummy_submission(
            SubmissionBody::Frame(Frame::binary(vec![0u8; 64])),
            BatchHint::Auto,
        ))
        .unwrap();
        // header(14) + payload(64) = 78 bytes; with only 32 bytes left in
        // the aggregate this must force the slice to bypass it.
        let (_slice, batch) = q.drain_slice(8, 14, 4096, 4096 - 32);
        assert_eq!(batch, BatchHint::Off);
    }
}
