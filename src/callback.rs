//! The upstream callback capability: a narrow two-method completion that
//! the flusher invokes exactly once per accepted submission, success xor
//! failure, never under a lock.

use crate::error::FlushError;

/// Represents whatever future/promise/channel the host application uses
/// to observe a submission's outcome. Called exactly once, success xor
/// failure.
pub trait Completion: Send {
    fn succeeded(self: Box<Self>);
    fn failed(self: Box<Self>, err: FlushError);
}

/// A `Completion` built from two plain closures, for callers who don't
/// want to define a type just to observe a submission.
pub struct FnCompletion<S, F>
where
    S: FnOnce() + Send,
    F: FnOnce(FlushError) + Send,
{
    success: S,
    failure: F,
}

impl<S, F> FnCompletion<S, F>
where
    S: FnOnce() + Send,
    F: FnOnce(FlushError) + Send,
{
    pub fn new(success: S, failure: F) -> FnCompletion<S, F> {
        FnCompletion { success, failure }
    }
}

impl<S, F> Completion for FnCompletion<S, F>
where
    S: FnOnce() + Send,
    F: FnOnce(FlushError) + Send,
{
    fn succeeded(self: Box<Self>) {
        (self.success)()
    }

    fn failed(self: Box<Self>, err: FlushError) {
        (self.failure)(err)
    }
}
