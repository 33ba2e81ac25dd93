use crate::error::{Error, Result};
use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cancels every future run through it, including ones started after
/// `cancel` was called.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    handles: Mutex<Vec<AbortHandle>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let handles = match self.inner.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Drives `future` to completion unless the token fires first, in which
    /// case the future is dropped (aborting any request it owns) and
    /// `Error::Cancelled` is returned.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (handle, registration) = AbortHandle::new_pair();
        match self.inner.handles.lock() {
            Ok(mut handles) => handles.push(handle.clone()),
            Err(poisoned) => poisoned.into_inner().push(handle.clone()),
        }
        // cancel() may have drained the list between the check and the push
        if self.is_cancelled() {
            handle.abort();
        }
        Abortable::new(future, registration)
            .await
            .map_err(|_| Error::Cancelled)
    }
}
