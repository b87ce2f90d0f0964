//! Bounded Dispatcher
//!
//! Bridges async handlers to synchronous clients. Each unit of work runs on
//! tokio's blocking pool, but only after acquiring one of `capacity` permits,
//! so at most `capacity` blocking calls execute at once across the process.
//! Excess callers wait in FIFO order on the semaphore.
//!
//! The work's own error is returned unchanged. Failures of the dispatcher
//! itself (closed, panicked, cancelled) are reported as [`DispatchError`].

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task;

/// Pool size used when `DEFAULT_MAX_THREADS` is not configured
pub const DEFAULT_MAX_THREADS: usize = 4;

/// Failure of the dispatcher rather than of the dispatched work
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is closed")]
    Closed,

    #[error("blocking task panicked: {0}")]
    Panicked(String),

    #[error("blocking task was cancelled")]
    Cancelled,
}

/// Process-wide bounded pool for blocking work. Cloning shares the pool.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    permits: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    /// Create a dispatcher allowing `capacity` concurrent blocking calls (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Blocking calls currently executing
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Stop admitting new work. Already running work completes normally.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Run `work` once on the blocking pool and return its value
    pub async fn submit<F, T>(&self, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        let inner = self.inner.clone();
        let handle = task::spawn_blocking(move || {
            // The permit is released only when the work itself returns,
            // even if the awaiting caller has gone away.
            let _permit = permit;
            let _in_flight = InFlightGuard::enter(&inner.in_flight);
            work()
        });

        handle.await.map_err(|err| {
            if err.is_panic() {
                DispatchError::Panicked(panic_message(err.into_panic()))
            } else {
                DispatchError::Cancelled
            }
        })
    }

    /// Run fallible `work`; its error reaches the caller as-is
    pub async fn run<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DispatchError> + Send + 'static,
    {
        self.submit(work).await.map_err(E::from)?
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THREADS)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[derive(Debug, PartialEq)]
    enum WorkError {
        Refused(&'static str),
        Dispatch(DispatchError),
    }

    impl From<DispatchError> for WorkError {
        fn from(err: DispatchError) -> Self {
            WorkError::Dispatch(err)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let dispatcher = Dispatcher::new(4);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let mut handles = Vec::new();
        for i in 0..10usize {
            let dispatcher = dispatcher.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .submit(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(100));
                        running.fetch_sub(1, Ordering::SeqCst);
                        i
                    })
                    .await
            }));
        }

        let mut done = Vec::new();
        for handle in handles {
            done.push(handle.await.unwrap().unwrap());
        }
        done.sort_unstable();

        assert_eq!(done, (0..10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 4);
        // ceil(10 / 4) rounds of 100ms
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.available(), 4);
    }

    #[tokio::test]
    async fn test_work_error_is_transparent() {
        let dispatcher = Dispatcher::new(1);
        let result: Result<u32, WorkError> = dispatcher
            .run(|| Err(WorkError::Refused("quota exceeded")))
            .await;
        assert_eq!(result, Err(WorkError::Refused("quota exceeded")));
    }

    #[tokio::test]
    async fn test_value_is_returned() {
        let dispatcher = Dispatcher::default();
        let result: Result<String, WorkError> =
            dispatcher.run(|| Ok("done".to_string())).await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(dispatcher.capacity(), DEFAULT_MAX_THREADS);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let dispatcher = Dispatcher::new(2);
        let result = dispatcher.submit(|| -> u32 { panic!("boom") }).await;
        assert_eq!(result, Err(DispatchError::Panicked("boom".to_string())));
        // The permit must come back after a panic
        assert_eq!(dispatcher.available(), 2);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_rejects_work() {
        let dispatcher = Dispatcher::new(2);
        dispatcher.close();
        assert!(dispatcher.is_closed());

        let result: Result<(), WorkError> = dispatcher.run(|| Ok(())).await;
        assert_eq!(result, Err(WorkError::Dispatch(DispatchError::Closed)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(Dispatcher::new(0).capacity(), 1);
    }
}
