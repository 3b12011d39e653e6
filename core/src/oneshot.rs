//! Lazy single-element stream.
//!
//! # Design
//! A `OneShot<T>` holds the *recipe* for a request, not a running request.
//! The recipe is turned into a future on first poll, the future's output is
//! yielded as the only item, and the stream then stays terminated. Dropping
//! the stream drops the future, which abandons an in-flight reqwest call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream, StreamExt};
use futures::FutureExt;

use crate::error::ApiError;

type Recipe<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, ApiError>> + Send>;

enum State<T> {
    Idle(Recipe<T>),
    Running(BoxFuture<'static, Result<T, ApiError>>),
    Done,
}

/// A stream that yields exactly one `Result` and then ends.
pub struct OneShot<T> {
    state: State<T>,
}

impl<T: Send + 'static> OneShot<T> {
    /// Wrap `make`, which is not called until the stream is first polled.
    pub fn new<F, Fut>(make: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            state: State::Idle(Box::new(move || make().boxed())),
        }
    }

    /// Await the single item.
    ///
    /// Fails with `ApiError::Exhausted` if the stream was polled to
    /// completion before this call.
    pub async fn single(mut self) -> Result<T, ApiError> {
        self.next().await.unwrap_or(Err(ApiError::Exhausted))
    }
}

impl<T> OneShot<T> {
    /// True until the stream has been polled for the first time.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle(_))
    }
}

impl<T> Stream for OneShot<T> {
    type Item = Result<T, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, State::Done) {
                State::Idle(recipe) => this.state = State::Running(recipe()),
                State::Running(mut fut) => {
                    return match fut.poll_unpin(cx) {
                        Poll::Ready(result) => Poll::Ready(Some(result)),
                        Poll::Pending => {
                            this.state = State::Running(fut);
                            Poll::Pending
                        }
                    };
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            State::Done => (0, Some(0)),
            _ => (0, Some(1)),
        }
    }
}

impl<T> FusedStream for OneShot<T> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl<T> fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Idle(_) => "idle",
            State::Running(_) => "running",
            State::Done => "done",
        };
        f.debug_struct("OneShot").field("state", &state).finish()
    }
}
