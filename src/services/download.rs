//! Completion tracking for streamed downloads.

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use std::io;

/// Runs a hook once `expected` bytes have been forwarded.
///
/// HTTP servers stop polling a body as soon as `Content-Length` bytes have
/// gone out, so the end of the inner stream may never be observed. The hook
/// fires from `record` when the count is reached, or from `Drop` for an
/// empty body.
struct Completion<F: FnOnce()> {
    expected: u64,
    forwarded: u64,
    hook: Option<F>,
}

impl<F: FnOnce()> Completion<F> {
    fn new(expected: u64, hook: F) -> Self {
        Self {
            expected,
            forwarded: 0,
            hook: Some(hook),
        }
    }

    fn record(&mut self, len: usize) {
        self.forwarded += len as u64;
        if self.forwarded >= self.expected {
            self.fire();
        }
    }

    fn fire(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }

    fn disarm(&mut self) {
        self.hook = None;
    }
}

impl<F: FnOnce()> Drop for Completion<F> {
    fn drop(&mut self) {
        if self.forwarded >= self.expected {
            self.fire();
        }
    }
}

/// Forward `inner` and call `on_complete` once `expected` bytes went through.
///
/// The hook does not run if the inner stream yields an error (the stream
/// stops right after forwarding it), if it ends short of `expected`, or if
/// the returned stream is dropped before that many bytes were taken, as
/// happens when a client disconnects.
pub fn on_completion<S, F>(
    inner: S,
    expected: u64,
    on_complete: F,
) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    F: FnOnce() + Send + 'static,
{
    let completion = Completion::new(expected, on_complete);
    stream::unfold(Some((inner, completion)), |state| async move {
        let (mut inner, mut completion) = state?;
        match inner.next().await {
            Some(Ok(chunk)) => {
                completion.record(chunk.len());
                Some((Ok(chunk), Some((inner, completion))))
            }
            Some(Err(err)) => {
                completion.disarm();
                Some((Err(err), None))
            }
            None => None,
        }
    })
}
