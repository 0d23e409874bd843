//! Delayed one-shot tasks

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::Instrument;

/// A unit of deferred work
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs `task` once after `delay`.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Spawns each task on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                task.await;
            }
            .in_current_span(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        TokioScheduler.schedule(
            Duration::from_secs(1),
            Box::pin(async move { flag.store(true, Ordering::SeqCst) }),
        );

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
