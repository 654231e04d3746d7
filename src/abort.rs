//! Cancellation for in-flight backend calls.
//!
//! An [`AbortController`] owns the switch; [`AbortSignal`]s are cheap clones
//! handed to async operations, which race their work against
//! [`AbortSignal::aborted`] and re-check [`AbortSignal::check`] after every
//! await before touching shared state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{EditError, Result};

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

impl AbortSignal {
    /// A signal that is never triggered.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// `Err(EditError::Aborted)` once the controller has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(EditError::Aborted)
        } else {
            Ok(())
        }
    }

    /// True when both signals belong to the same controller.
    pub fn same_as(&self, other: &AbortSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolves when the signal fires (immediately if it already has).
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless the signal fires first; re-checks the signal after
    /// completion so a late abort still wins.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let out = tokio::select! {
            biased;
            _ = self.aborted() => return Err(EditError::Aborted),
            out = fut => out,
        };
        self.check()?;
        out
    }
}

/// Owner side of an [`AbortSignal`].
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.inner.aborted.store(true, Ordering::SeqCst);
        self.signal.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}
