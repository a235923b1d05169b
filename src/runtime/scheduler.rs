//! Per-bot task scheduler — a fixed-interval repeater queue and a one-shot
//! date-scheduled queue, each driven by its own sweep loop.
//!
//! Sweeps are pure functions over an injected `now`, so timing behavior is
//! testable without real timers; the background loops feed them wall-clock
//! time.

use apiary_core::config::SchedulerConfig;
use apiary_core::error::{ApiaryError, Result};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Boxed task action.
pub type TaskAction = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Recurring task; re-armed after each firing.
pub struct RepeaterTask {
    action: TaskAction,
    interval: Duration,
    last_ran_at: DateTime<Utc>,
}

/// One-shot task; removed from the queue once fired.
pub struct OneShotTask {
    action: TaskAction,
    fire_at: DateTime<Utc>,
}

/// Two independently swept task queues owned by one bot.
pub struct Scheduler {
    config: SchedulerConfig,
    repeaters: Arc<Mutex<Vec<RepeaterTask>>>,
    oneshots: Arc<Mutex<Vec<OneShotTask>>>,
    repeater_sweep: Mutex<Option<JoinHandle<()>>>,
    oneshot_sweep: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            repeaters: Arc::new(Mutex::new(Vec::new())),
            oneshots: Arc::new(Mutex::new(Vec::new())),
            repeater_sweep: Mutex::new(None),
            oneshot_sweep: Mutex::new(None),
        }
    }

    fn action_from<F, Fut>(action: F) -> TaskAction
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Arc::new(move || Box::pin(action()))
    }

    /// Register a recurring task. The first firing is one full interval
    /// after registration. Non-positive intervals are rejected.
    pub async fn repeat<F, Fut>(&self, interval: Duration, action: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if interval <= Duration::zero() {
            return Err(ApiaryError::Validation(format!(
                "repeater interval must be positive, got {interval}"
            )));
        }
        self.repeaters.lock().await.push(RepeaterTask {
            action: Self::action_from(action),
            interval,
            last_ran_at: Utc::now(),
        });
        Ok(())
    }

    /// Register a one-shot task. Times in the past are rejected at
    /// registration, never silently dropped later.
    pub async fn schedule_at<F, Fut>(&self, fire_at: DateTime<Utc>, action: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if fire_at <= Utc::now() {
            return Err(ApiaryError::Validation(format!(
                "scheduled time {fire_at} is not in the future"
            )));
        }
        self.oneshots.lock().await.push(OneShotTask {
            action: Self::action_from(action),
            fire_at,
        });
        Ok(())
    }

    /// Start both sweep loops.
    pub async fn start(&self) {
        self.start_repeater_sweep().await;
        self.start_oneshot_sweep().await;
    }

    async fn start_repeater_sweep(&self) {
        let tasks = self.repeaters.clone();
        let period = std::time::Duration::from_secs(self.config.repeater_poll_secs);
        let mut slot = self.repeater_sweep.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let due = due_repeaters(&mut *tasks.lock().await, Utc::now());
                for action in due {
                    action().await;
                }
            }
        }));
    }

    async fn start_oneshot_sweep(&self) {
        let tasks = self.oneshots.clone();
        let period = std::time::Duration::from_secs(self.config.oneshot_poll_secs);
        let mut slot = self.oneshot_sweep.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let due = due_oneshots(&mut *tasks.lock().await, Utc::now());
                for action in due {
                    action().await;
                }
            }
        }));
    }

    /// Cancel the repeater sweep, clear its queue, and restart the sweep.
    pub async fn reset_repeaters(&self) {
        self.repeaters.lock().await.clear();
        self.start_repeater_sweep().await;
        debug!("repeater queue reset");
    }

    /// Cancel the one-shot sweep, clear its queue, and restart the sweep.
    pub async fn reset_oneshots(&self) {
        self.oneshots.lock().await.clear();
        self.start_oneshot_sweep().await;
        debug!("one-shot queue reset");
    }

    /// Stop both sweeps and drop all entries. Already-dispatched actions
    /// complete on their own; only the recurring sweeps are cancelled.
    pub async fn stop(&self) {
        if let Some(handle) = self.repeater_sweep.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.oneshot_sweep.lock().await.take() {
            handle.abort();
        }
        self.repeaters.lock().await.clear();
        self.oneshots.lock().await.clear();
    }
}

/// Collect repeater actions due at `now`, re-arming each fired entry.
fn due_repeaters(tasks: &mut Vec<RepeaterTask>, now: DateTime<Utc>) -> Vec<TaskAction> {
    let mut due = Vec::new();
    for task in tasks.iter_mut() {
        if now - task.last_ran_at >= task.interval {
            task.last_ran_at = now;
            due.push(task.action.clone());
        }
    }
    due
}

/// Drain one-shot actions due at `now`, removing each fired entry.
fn due_oneshots(tasks: &mut Vec<OneShotTask>, now: DateTime<Utc>) -> Vec<TaskAction> {
    let mut due = Vec::new();
    let mut index = 0;
    while index < tasks.len() {
        if now >= tasks[index].fire_at {
            due.push(tasks.remove(index).action);
        } else {
            index += 1;
        }
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_action(counter: Arc<AtomicUsize>) -> TaskAction {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_past_oneshot_rejected_at_registration() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let result = scheduler
            .schedule_at(Utc::now() - Duration::seconds(1), || async {})
            .await;
        assert!(matches!(result, Err(ApiaryError::Validation(_))));
        assert!(scheduler.oneshots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_repeater_rejected() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let result = scheduler.repeat(Duration::zero(), || async {}).await;
        assert!(matches!(result, Err(ApiaryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_oneshot_fires_once_and_is_removed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t0 = Utc::now();
        let mut tasks = vec![OneShotTask {
            action: counting_action(counter.clone()),
            fire_at: t0 + Duration::seconds(30),
        }];

        // Not yet due.
        assert!(due_oneshots(&mut tasks, t0 + Duration::seconds(10)).is_empty());
        assert_eq!(tasks.len(), 1);

        // Due: fired and removed.
        for action in due_oneshots(&mut tasks, t0 + Duration::seconds(31)) {
            action().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(tasks.is_empty());

        // A later sweep finds nothing.
        assert!(due_oneshots(&mut tasks, t0 + Duration::seconds(120)).is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeater_interval_timing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t0 = Utc::now();
        let mut tasks = vec![RepeaterTask {
            action: counting_action(counter.clone()),
            interval: Duration::seconds(10),
            last_ran_at: t0,
        }];

        // t=5s: not due.
        assert!(due_repeaters(&mut tasks, t0 + Duration::seconds(5)).is_empty());

        // t=10s: due, and last_ran_at advances.
        let due = due_repeaters(&mut tasks, t0 + Duration::seconds(10));
        assert_eq!(due.len(), 1);
        for action in due {
            action().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // t=15s: re-armed, not due again before t=20s.
        assert!(due_repeaters(&mut tasks, t0 + Duration::seconds(15)).is_empty());
        assert_eq!(due_repeaters(&mut tasks, t0 + Duration::seconds(20)).len(), 1);

        // The entry persists after firing.
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_queue_and_restarts_sweep() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .schedule_at(Utc::now() + Duration::minutes(5), || async {})
            .await
            .unwrap();
        scheduler.repeat(Duration::seconds(30), || async {}).await.unwrap();

        scheduler.reset_oneshots().await;
        scheduler.reset_repeaters().await;

        assert!(scheduler.oneshots.lock().await.is_empty());
        assert!(scheduler.repeaters.lock().await.is_empty());
        assert!(scheduler.repeater_sweep.lock().await.is_some());
        assert!(scheduler.oneshot_sweep.lock().await.is_some());

        scheduler.stop().await;
    }
}
