pub mod dispatch;
pub mod reputation;

use crate::config::SchedulerConfig;
use crate::directory::PeerDirectory;
use crate::store::RequestStore;
use crate::transport::SecureTransport;
use dispatch::RoundSummary;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Owns the repeating trigger for dispatch rounds.
///
/// Two states: idle and active. `activate` is a no-op when already
/// active, `deactivate` a no-op when idle. There is no terminal state;
/// the scheduler lives for the application's lifetime.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<RequestStore>,
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn SecureTransport>,
    /// Handle of the interval task while active.
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Unix millis of the last timer firing (or activation).
    last_round_started_at: AtomicU64,
    /// At most one round in flight: timer ticks skip while a forced
    /// round is still running, and vice versa.
    round_guard: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<RequestStore>,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn SecureTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            directory,
            transport,
            timer: Mutex::new(None),
            last_round_started_at: AtomicU64::new(0),
            round_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    /// Start the recurring dispatch timer. No-op if already active.
    pub fn activate(self: &Arc<Self>) {
        let mut timer = self.timer.lock().unwrap();
        if timer.is_some() {
            tracing::debug!("[scheduler] Already active, ignoring activation");
            return;
        }

        tracing::info!("[scheduler] Requests scheduler activated");
        self.stamp_round_start();

        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.requests_interval_ms);

        // Create the interval here so its epoch is the activation
        // instant, matching `last_round_started_at`.
        let mut interval = tokio::time::interval(period);

        *timer = Some(tokio::spawn(async move {
            interval.tick().await; // skip first immediate tick
            loop {
                interval.tick().await;
                let scheduler = match weak.upgrade() {
                    Some(s) => s,
                    None => break,
                };
                scheduler.stamp_round_start();

                // A still-running forced round wins; the queue is
                // retried on the next firing anyway.
                match scheduler.round_guard.try_lock() {
                    Ok(_guard) => {
                        scheduler.run_round_logged().await;
                    }
                    Err(_) => {
                        tracing::debug!("[scheduler] Previous round still running, skipping tick");
                    }
                };
            }
        }));
    }

    /// Stop the recurring timer. No-op when idle.
    pub fn deactivate(&self) {
        let mut timer = self.timer.lock().unwrap();
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::info!("[scheduler] Requests scheduler deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.timer.lock().unwrap().is_some()
    }

    /// Run one dispatch round immediately, independent of the timer and
    /// without resetting its schedule.
    pub async fn force_trigger(&self) -> RoundSummary {
        tracing::info!("[scheduler] Force requests scheduler sending");
        let _guard = self.round_guard.lock().await;
        self.run_round_logged().await
    }

    /// Milliseconds until the next timer firing, or -1 when idle.
    pub fn remaining_ms(&self) -> i64 {
        if !self.is_active() {
            return -1;
        }

        let elapsed = now_ms().saturating_sub(self.last_round_started_at.load(Ordering::Relaxed));
        self.config.requests_interval_ms as i64 - elapsed as i64
    }

    /// Administrative flush of the whole pending queue.
    pub fn flush(&self) {
        if let Err(e) = self.store.remove_all() {
            tracing::error!("[scheduler] Cannot flush the requests: {}", e);
        }
    }

    fn stamp_round_start(&self) {
        self.last_round_started_at.store(now_ms(), Ordering::Relaxed);
    }

    async fn run_round_logged(&self) -> RoundSummary {
        match dispatch::run_round(&self.store, &self.directory, &self.transport, &self.config)
            .await
        {
            Ok(summary) => {
                if summary.requests > 0 {
                    tracing::info!(
                        "[scheduler] Round done: {} requests to {} pods ({} good, {} bad, {} completed)",
                        summary.requests,
                        summary.pods,
                        summary.good.len(),
                        summary.bad.len(),
                        summary.requests_completed
                    );
                }
                summary
            }
            Err(e) => {
                // Retried as-is on the next firing
                tracing::error!("[scheduler] Cannot get the list of requests: {}", e);
                RoundSummary::default()
            }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
