//! Resolve-once values
//!
//! A [`Deferred`] is either already resolved or will be resolved exactly once,
//! by a [`Completer`] or by a future supplied up front. It is consumed by the
//! single continuation that awaits it.

use crate::error::{BlockStreamError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use tokio::sync::oneshot;

/// A value that is resolved now or exactly once later
pub struct Deferred<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    Ready(T),
    Waiting(oneshot::Receiver<T>),
    Future(BoxFuture<'static, T>),
}

/// Write side of a pending [`Deferred`]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T: Send + 'static> Deferred<T> {
    /// An already resolved value
    pub fn resolved(value: T) -> Self {
        Self {
            inner: Inner::Ready(value),
        }
    }

    /// A pending value and the handle that resolves it
    pub fn pending() -> (Completer<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            Completer { tx },
            Self {
                inner: Inner::Waiting(rx),
            },
        )
    }

    /// A value produced by `future`
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            inner: Inner::Future(future.boxed()),
        }
    }

    /// Whether the value is available without waiting
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }

    /// The value, if available without waiting
    pub fn get(&self) -> Option<&T> {
        match &self.inner {
            Inner::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// Wait for the value.
    ///
    /// Fails with [`BlockStreamError::Abandoned`] if the completer was dropped
    /// without resolving.
    pub async fn resolve(self) -> Result<T> {
        match self.inner {
            Inner::Ready(v) => Ok(v),
            Inner::Waiting(rx) => rx.await.map_err(|_| {
                BlockStreamError::Abandoned("completer dropped before resolving".into())
            }),
            Inner::Future(fut) => Ok(fut.await),
        }
    }
}

impl<T> Completer<T> {
    /// Resolve the paired deferred. Returns false if nobody is waiting anymore.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Whether the paired deferred has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Ready(v) => f.debug_tuple("Deferred::Ready").field(v).finish(),
            Inner::Waiting(_) => f.write_str("Deferred::Waiting"),
            Inner::Future(_) => f.write_str("Deferred::Future"),
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("abandoned", &self.tx.is_closed())
            .finish()
    }
}
