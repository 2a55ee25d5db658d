use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type RefreshTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One-shot scheduling seam for the proactive session refresh.
///
/// The manager only ever needs schedule-once and cancel, so the trait stays
/// that small; tests can substitute an implementation that fires on demand
/// instead of waiting for wall-clock time.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule_once(&self, delay: Duration, task: RefreshTask) -> ScheduledRefresh;
}

/// Handle to a pending one-shot task. Dropping it cancels the task, so
/// replacing the manager's timer slot implicitly cancels the superseded
/// timer.
pub struct ScheduledRefresh {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledRefresh {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ScheduledRefresh {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Production scheduler: a spawned task that sleeps and then runs the
/// refresh, aborted on cancel.
#[derive(Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: RefreshTask) -> ScheduledRefresh {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let abort = handle.abort_handle();
        ScheduledRefresh::new(move || abort.abort())
    }
}
