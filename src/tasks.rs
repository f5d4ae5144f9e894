use std::any::Any;
use std::future;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};

/// Holds at most one pending value together with the deadline at which it
/// settles. Pushing a new value replaces both; cancelling drops them. The
/// deadline is the timer handle: there is no background task to clean up.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T) {
        self.pending = Some((value, Instant::now() + self.quiet));
    }

    /// Swaps the pending value without moving its deadline. Returns `false`
    /// when nothing is pending.
    pub fn refresh(&mut self, value: T) -> bool {
        match self.pending.as_mut() {
            Some((pending, _)) => {
                *pending = value;
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolves with the pending value once its quiet window elapses; never
    /// resolves while nothing is pending. Cancel-safe: dropping the future
    /// leaves the pending value in place.
    pub async fn settled(&mut self) -> T {
        loop {
            let Some(deadline) = self.pending.as_ref().map(|(_, deadline)| *deadline) else {
                future::pending::<()>().await;
                continue;
            };
            time::sleep_until(deadline).await;
            if let Some((value, _)) = self.pending.take() {
                return value;
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct TaskGuard<T = ()> {
    handle: JoinHandle<T>,
}

impl<T> TaskGuard<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the task without giving up the guard. Cancel-safe.
    pub async fn join(&mut self) -> Result<T, JoinError> {
        (&mut self.handle).await
    }
}

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    describe_panic(err.into_panic())
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn debouncer_yields_only_the_last_value_of_a_burst() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        let start = Instant::now();
        debouncer.push("a");
        time::sleep(Duration::from_millis(50)).await;
        debouncer.push("ab");
        time::sleep(Duration::from_millis(50)).await;
        debouncer.push("abc");

        assert_eq!(debouncer.settled().await, "abc");
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_debouncer_never_settles() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.push(1);
        assert_eq!(debouncer.cancel(), Some(1));
        let waited = time::timeout(Duration::from_secs(1), debouncer.settled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_aborts_task() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = reached.clone();
        let guard = TaskGuard::new(tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        drop(guard);
        time::sleep(Duration::from_millis(500)).await;
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panic_message_extracts_payload() {
        let err = tokio::spawn(async { panic!("boom") })
            .await
            .expect_err("task panics");
        assert_eq!(panic_message(err), "boom");
    }
}
