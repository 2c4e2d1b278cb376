//! Promise types for interacting with an asynchronous operation resolved on another thread: the
//! mesh worker pool, the network thread, or the engine thread's own command queue.

use std::future::Future;
use std::pin::Pin;

use anyhow::Error;
use tracing::error;

use crate::prelude::*;

/// The operations of [`AsyncResult`] that do not depend on the held result type, so a caller that
/// only cares about success/failure can hold a `Box<dyn GenericAsyncResult>` regardless of what
/// each individual operation actually returns.
#[allow(clippy::wrong_self_convention)]
pub trait GenericAsyncResult {
    /// Checks if the result is ready.
    #[must_use]
    fn is_ready(&mut self) -> bool;

    /// Returns if the inner result is `Ok`, or `None` if not ready yet.
    #[must_use]
    fn is_ok(&mut self) -> Option<bool>;

    /// Returns if the inner result is `Err`, or `None` if not ready yet.
    #[must_use]
    fn is_err(&mut self) -> Option<bool>;

    /// Checks if the result is available right now, returns a type-erased reference if it is.
    fn generic_poll(&mut self) -> Option<Result<(), &anyhow::Error>>;

    /// Waits for the result by blocking the current thread.
    fn blocking_generic_wait(self: Box<Self>) -> Result<(), anyhow::Error>;

    /// Waits for the result by awaiting the inner future.
    #[must_use]
    fn async_generic_wait(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

    /// Spawns a Tokio task waiting for the result, logging the error if it fails.
    fn async_generic_log_when_fails(self: Box<Self>, context: &'static str);
}

/// A result holder for an asynchronous operation happening on another thread or at another time —
/// a mesh worker finishing a chunk, the network thread completing a handshake, or the engine
/// thread applying a queued world mutation.
#[derive(Debug)]
#[must_use]
pub enum AsyncResult<OkT: Send + 'static> {
    /// Not yet queried, or queried and not completed yet.
    Unresolved(AsyncOneshotReceiver<Result<OkT>>),
    /// Queried and completed.
    Resolved(Result<OkT>),
    /// Queried and the other end was dropped without resolving.
    Aborted(anyhow::Error),
}

impl<OkT: Send + 'static> AsyncResult<OkT> {
    /// Constructs a new unresolved variant along with the channel that resolves it.
    pub fn new_pair() -> (Self, AsyncOneshotSender<Result<OkT>>) {
        let (tx, rx) = async_oneshot_channel();
        (Self::Unresolved(rx), tx)
    }

    /// Constructs a pre-resolved success.
    pub fn new_ok(val: OkT) -> Self {
        Self::Resolved(Ok(val))
    }

    /// Constructs a pre-resolved failure.
    pub fn new_err(err: anyhow::Error) -> Self {
        Self::Resolved(Err(err))
    }

    /// Checks if the result is available right now, returns a reference if it is.
    pub fn poll(&mut self) -> Option<Result<&OkT, &anyhow::Error>> {
        match self {
            Self::Unresolved(recv) => match recv.try_recv() {
                Ok(v) => {
                    *self = Self::Resolved(v);
                    let Self::Resolved(v) = self else { unreachable!() };
                    Some(v.as_ref())
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => None,
                Err(e @ tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    *self = Self::Aborted(anyhow::Error::from(e));
                    None
                }
            },
            Self::Resolved(val) => Some(val.as_ref()),
            Self::Aborted(err) => Some(Err(err)),
        }
    }

    /// Waits for the result by blocking the current thread. Do not use in async contexts.
    pub fn blocking_wait(self) -> Result<OkT> {
        match self {
            Self::Unresolved(chan) => match chan.blocking_recv() {
                Ok(v) => v,
                Err(e) => Err(anyhow::Error::from(e)),
            },
            Self::Resolved(val) => val,
            Self::Aborted(err) => Err(err),
        }
    }

    /// Waits for the result by awaiting the inner future.
    pub async fn async_wait(self) -> Result<OkT> {
        match self {
            Self::Unresolved(chan) => match chan.await {
                Ok(v) => v,
                Err(e) => Err(anyhow::Error::from(e)),
            },
            Self::Resolved(val) => val,
            Self::Aborted(err) => Err(err),
        }
    }

    async fn async_generic_wait_impl(self) -> Result<()> {
        self.async_wait().await.map(|_| ()).map_err(anyhow::Error::from)
    }

    /// Spawns a Tokio task waiting for the result, logging the error if it fails.
    pub fn async_log_when_fails(self, context: &'static str) {
        tokio::spawn(async move {
            if let Err(e) = self.async_wait().await {
                error!("Error resolving asynchronous result ({context}): {e}");
            }
        });
    }
}

impl<OkT: Send + 'static> GenericAsyncResult for AsyncResult<OkT> {
    fn is_ready(&mut self) -> bool {
        self.poll().is_some()
    }

    fn is_ok(&mut self) -> Option<bool> {
        self.poll().as_ref().map(Result::is_ok)
    }

    fn is_err(&mut self) -> Option<bool> {
        self.poll().as_ref().map(Result::is_err)
    }

    fn generic_poll(&mut self) -> Option<Result<(), &Error>> {
        self.poll().as_ref().map(|v| v.map(|_| ()))
    }

    fn blocking_generic_wait(self: Box<Self>) -> Result<()> {
        self.blocking_wait().map(|_| ()).map_err(anyhow::Error::from)
    }

    fn async_generic_wait(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>> {
        Box::pin(self.async_generic_wait_impl())
    }

    fn async_generic_log_when_fails(self: Box<Self>, context: &'static str) {
        self.async_log_when_fails(context)
    }
}
