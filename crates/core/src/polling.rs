use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Runs a poll function periodically on a background task
///
/// The first poll happens one interval after `start`. A failing poll is
/// logged and polling continues.
pub struct Poller {
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling, replacing a running poll task
    pub async fn start<F, Fut>(&self, log_id: impl Into<String>, poll: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let interval = self.interval;
        let log_id = log_id.into();

        tracing::debug!("[{}] Starting poll task every {:?}", log_id, interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = poll().await {
                    tracing::warn!("[{}] Poll failed: {:#}", log_id, e);
                }
            }
        });

        if let Some(previous) = self.handle.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Stop polling. Returns true if a poll task was running.
    pub async fn stop(&self) -> bool {
        match self.handle.lock().await.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
