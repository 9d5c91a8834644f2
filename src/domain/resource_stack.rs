//! LIFO cleanup stack for resources opened while dialing.
//!
//! Every connection and client opened by the dial pipeline registers a
//! [`Closer`] here. Closing the stack runs closers in reverse registration
//! order so that tunneled resources go before the hops carrying them.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{DialError, Result};

/// A resource that can be released.
#[async_trait]
pub trait Closer: Send + Sync {
    async fn close(&self) -> Result<()>;
}

type CloseFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Closer backed by an async function, called on every close.
struct FnCloser {
    f: CloseFn,
}

#[async_trait]
impl Closer for FnCloser {
    async fn close(&self) -> Result<()> {
        (self.f)().await
    }
}

/// Wrap an async function as a [`Closer`].
///
/// The function runs once per close of every stack holding it. Resources
/// that must only be released once carry their own guard.
pub fn closer_fn<F, Fut>(f: F) -> Arc<dyn Closer>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f: CloseFn = Box::new(move || f().boxed());
    Arc::new(FnCloser { f })
}

/// Shared handle to an ordered list of closers.
///
/// Cloning the handle shares the underlying list. Registration takes the
/// write lock; closing takes the read lock, so concurrent closes are allowed
/// and a push issued during a close waits for it to finish.
#[derive(Clone, Default)]
pub struct ResourceStack {
    closers: Arc<RwLock<Vec<Arc<dyn Closer>>>>,
}

impl ResourceStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closer on top of the stack.
    pub async fn push(&self, closer: Arc<dyn Closer>) {
        self.closers.write().await.push(closer);
    }

    /// Register a function to run each time the stack closes.
    pub async fn push_fn<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push(closer_fn(f)).await;
    }

    /// Append a snapshot of `other`'s closers, keeping their relative order.
    ///
    /// Closing this stack then tears down `other`'s resources as well, in
    /// `other`'s own LIFO order. `other` itself is left untouched.
    pub async fn push_stack(&self, other: &Self) {
        let snapshot = other.closers.read().await.clone();
        if snapshot.is_empty() {
            return;
        }
        self.closers.write().await.extend(snapshot);
    }

    /// Run every closer, most recently registered first.
    ///
    /// All closers run even when some fail. A panicking closer is contained
    /// and reported as [`DialError::CloserPanicked`]. Registrations are kept;
    /// see [`ResourceStack::reset`].
    ///
    /// # Errors
    ///
    /// Returns the first error encountered in closing order.
    pub async fn close(&self) -> Result<()> {
        let closers = self.closers.read().await;
        let mut first_error = None;

        for (index, closer) in closers.iter().enumerate().rev() {
            let outcome = AssertUnwindSafe(closer.close()).catch_unwind().await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(_) => DialError::CloserPanicked,
            };
            warn!(index, error = %error, "Resource closer failed");
            first_error.get_or_insert(error);
        }

        debug!(count = closers.len(), "Resource stack closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Drop every registration without running it.
    pub async fn reset(&self) {
        self.closers.write().await.clear();
    }

    /// Number of registered closers.
    pub async fn len(&self) -> usize {
        self.closers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.closers.read().await.is_empty()
    }
}

#[async_trait]
impl Closer for ResourceStack {
    async fn close(&self) -> Result<()> {
        Self::close(self).await
    }
}

impl std::fmt::Debug for ResourceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStack").finish_non_exhaustive()
    }
}
