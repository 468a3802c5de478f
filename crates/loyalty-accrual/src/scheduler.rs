//! # Background Tasks
//!
//! Registration, startup and shutdown of long-lived tasks.
//!
//! ## Periodic Task Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  spawn_periodic(name, period, tick)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────┐   cancelled?   ┌────────────┐                       │
//! │  │ wait for the  │───── yes ─────►│   stop     │                       │
//! │  │ next interval │                └────────────┘                       │
//! │  └──────┬────────┘                      ▲                              │
//! │         │ no                            │                              │
//! │         ▼                               │                              │
//! │  ┌───────────────┐   panic   ┌──────────┴─────────┐                    │
//! │  │  tick().await │──────────►│ log error, stop    │                    │
//! │  └──────┬────────┘           │ (never restarted)  │                    │
//! │         │ done                └────────────────────┘                    │
//! │         └──────► back to wait                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is only observed between ticks, so a tick that has started
//! always runs to completion. A tick that overruns its period delays the
//! next one instead of bunching them up.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A registered background task.
struct RegisteredTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owner of every background task and their shared shutdown signal.
///
/// ## Usage
/// ```rust,ignore
/// let mut tasks = BackgroundTasks::new();
/// tasks.spawn_periodic("accrual_reconciler", Duration::from_secs(10), move || {
///     let reconciler = reconciler.clone();
///     async move { reconciler.tick().await; }
/// });
///
/// // Graceful shutdown
/// tasks.shutdown().await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawns a task, catching and logging any panic in it.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let wrapped = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) => debug!(task = %name, "Background task finished"),
                Err(panic) => error!(
                    task = %name,
                    panic = %panic_message(panic.as_ref()),
                    "Background task panicked, not restarting"
                ),
            }
        };

        let handle = tokio::spawn(wrapped);
        debug!(task = %name, "Registered background task");
        self.tasks.push(RegisteredTask { name, handle });
    }

    /// Spawns a task that calls `tick` once per `period` until shutdown.
    ///
    /// The first tick runs immediately.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();

        self.spawn(name, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                tick().await;
            }

            info!(task = %name, "Periodic task stopped");
        });
    }

    /// Returns true if the named task has exited (stopped or panicked).
    pub fn is_finished(&self, name: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.name == name && task.handle.is_finished())
    }

    /// Cancels every task and waits for each to finish.
    pub async fn shutdown(self) {
        info!("Shutting down {} background tasks...", self.tasks.len());

        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => debug!(task = %task.name, "Task completed"),
                Err(e) if e.is_cancelled() => debug!(task = %task.name, "Task cancelled"),
                Err(e) => error!(task = %task.name, error = ?e, "Task panicked"),
            }
        }

        info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> futures::future::Ready<()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        let tick = move || {
            handle.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        };
        (count, tick)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_shutdown() {
        let (count, tick) = counter();
        let mut tasks = BackgroundTasks::new();
        tasks.spawn_periodic("counter", Duration::from_secs(10), tick);

        // Ticks at 0s, 10s and 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        tasks.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_finishes_before_stop() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (started.clone(), finished.clone());

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_periodic("slow", Duration::from_secs(10), move || {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        tasks.shutdown().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_stops_task_without_restart() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = calls.clone();

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_periodic("fragile", Duration::from_secs(10), move || {
            let n = handle.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    panic!("tick blew up");
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(tasks.is_finished("fragile"));

        // Shutdown still completes cleanly
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_delays_next_tick() {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = starts.clone();
        let origin = tokio::time::Instant::now();

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_periodic("overrun", Duration::from_secs(10), move || {
            log.lock().unwrap().push(origin.elapsed().as_secs());
            async {
                tokio::time::sleep(Duration::from_secs(15)).await;
            }
        });

        tokio::time::sleep(Duration::from_secs(31)).await;
        tasks.shutdown().await;

        // The tick due at 10s fires once the first one ends at 15s
        let starts = starts.lock().unwrap().clone();
        assert_eq!(&starts[..2], [0, 15]);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "Unknown panic");
    }
}
