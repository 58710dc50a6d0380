//! Auto-refresh polling.
//!
//! A [`PollingController`] owns at most one background timer task. Each
//! tick runs the refresh callback; stopping (or dropping the controller)
//! signals the task to exit so no timer outlives its owner.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Controls one background refresh timer.
///
/// `start` is idempotent while a timer is running: the controller never
/// holds two live timers, so flipping auto-refresh on repeatedly cannot
/// stack refresh loops.
pub struct PollingController {
    active: Mutex<Option<ActivePoll>>,
}

struct ActivePoll {
    /// Sends `true` to signal the loop to stop.
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl PollingController {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Start polling: run `refresh` once every `period`, starting one
    /// period from now. No-op if a timer is already running. Zero periods
    /// are refused, since the timer cannot tick at that rate.
    pub fn start<F, Fut>(&self, period: Duration, refresh: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::warn!("refusing to start polling with a zero period");
            return;
        }

        let mut active = self.lock_active();
        if let Some(poll) = active.as_ref() {
            if !poll.task.is_finished() {
                tracing::debug!("polling already active; leaving the running timer alone");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_poll_loop(period, refresh, shutdown_rx));
        *active = Some(ActivePoll { shutdown_tx, task });
        tracing::info!(period_secs = period.as_secs_f64(), "polling started");
    }

    /// Stop polling and wait for the timer task to exit. Idempotent; a
    /// call with no timer running returns immediately.
    pub async fn stop(&self) {
        // Take the handle out of the lock before awaiting it.
        let poll = self.lock_active().take();
        let Some(poll) = poll else { return };

        // Ignore send errors: the task may already have exited.
        let _ = poll.shutdown_tx.send(true);
        if let Err(error) = poll.task.await {
            tracing::warn!(%error, "polling task did not exit cleanly");
        }
        tracing::info!("polling stopped");
    }

    pub fn is_polling(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|poll| !poll.task.is_finished())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActivePoll>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollingController {
    /// Signal the timer without awaiting it, so an owner dropped mid-flight
    /// does not leave a ticking task behind.
    fn drop(&mut self) {
        if let Some(poll) = self.lock_active().take() {
            let _ = poll.shutdown_tx.send(true);
        }
    }
}

impl std::fmt::Debug for PollingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingController")
            .field("is_polling", &self.is_polling())
            .finish()
    }
}

/// The timer loop: tick, refresh, repeat, until shut down.
async fn run_poll_loop<F, Fut>(period: Duration, refresh: F, mut shutdown_rx: watch::Receiver<bool>)
where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval(period);
    // A slow refresh skips the ticks it missed instead of replaying them
    // back to back.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                return;
            }
            _ = ticker.tick() => {
                refresh().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_refresh(counter: Arc<AtomicU64>) -> impl Fn() -> std::future::Ready<()> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn ticks_repeatedly_until_stopped() {
        let controller = PollingController::new();
        let counter = Arc::new(AtomicU64::new(0));

        controller.start(Duration::from_millis(20), counting_refresh(counter.clone()));
        tokio::time::sleep(Duration::from_millis(70)).await;
        controller.stop().await;

        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected at least 2 ticks, got {ticks}");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            counter.load(Ordering::SeqCst),
            ticks,
            "no ticks after stop"
        );
    }

    #[tokio::test]
    async fn drives_an_async_refresh_to_completion() {
        let controller = PollingController::new();
        let counter = Arc::new(AtomicU64::new(0));

        // Refresh closures in practice return async blocks, not ready
        // futures; the timer must own and drive them across ticks.
        let refresh_counter = counter.clone();
        controller.start(Duration::from_millis(20), move || {
            let counter = Arc::clone(&refresh_counter);
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(70)).await;
        controller.stop().await;

        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected at least 2 refreshes, got {ticks}");
    }

    #[tokio::test]
    async fn first_refresh_waits_one_full_period() {
        let controller = PollingController::new();
        let counter = Arc::new(AtomicU64::new(0));

        controller.start(Duration::from_millis(100), counting_refresh(counter.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0, "no immediate tick");
        controller.stop().await;
    }

    #[tokio::test]
    async fn second_start_is_ignored_while_running() {
        let controller = PollingController::new();
        let first = Arc::new(AtomicU64::new(0));
        let second = Arc::new(AtomicU64::new(0));

        controller.start(Duration::from_millis(20), counting_refresh(first.clone()));
        controller.start(Duration::from_millis(5), counting_refresh(second.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop().await;

        assert!(first.load(Ordering::SeqCst) >= 1, "original timer kept ticking");
        assert_eq!(
            second.load(Ordering::SeqCst),
            0,
            "second start must not spawn a competing timer"
        );
    }

    #[tokio::test]
    async fn can_restart_after_stop() {
        let controller = PollingController::new();
        let counter = Arc::new(AtomicU64::new(0));

        controller.start(Duration::from_millis(20), counting_refresh(counter.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.stop().await;
        let after_first_run = counter.load(Ordering::SeqCst);

        controller.start(Duration::from_millis(20), counting_refresh(counter.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop().await;

        assert!(
            counter.load(Ordering::SeqCst) > after_first_run,
            "restarted timer ticks again"
        );
    }

    #[tokio::test]
    async fn is_polling_tracks_lifecycle() {
        let controller = PollingController::new();
        assert!(!controller.is_polling());

        controller.start(Duration::from_millis(50), || std::future::ready(()));
        assert!(controller.is_polling());

        controller.stop().await;
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn stop_without_start_is_fine() {
        let controller = PollingController::new();
        controller.stop().await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn zero_period_is_refused() {
        let controller = PollingController::new();
        controller.start(Duration::ZERO, || std::future::ready(()));
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn drop_signals_the_timer() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let controller = PollingController::new();
            controller.start(Duration::from_millis(20), counting_refresh(counter.clone()));
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        let at_drop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            counter.load(Ordering::SeqCst),
            at_drop,
            "dropped controller leaves no ticking timer behind"
        );
    }
}
