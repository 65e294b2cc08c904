use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rate_limit::RateLimiter;
use crate::sessions::SessionManager;

/// Owns the background sweeps. Dropping it leaves the tasks running; call
/// `shutdown` to stop them.
pub struct Sweeper {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the session sweep (every `session_interval`) and the limiter
    /// eviction (once per limiter window).
    pub fn start(
        sessions: SessionManager,
        limiter: Arc<RateLimiter>,
        session_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(run_session_sweep(sessions, session_interval, cancel.clone())),
            tokio::spawn(run_eviction_loop(limiter, cancel.clone())),
        ];
        info!(
            "Sweeper started (sessions every {:?})",
            session_interval
        );
        Self { cancel, tasks }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Sweep task ended abnormally: {}", e);
            }
        }
        info!("Sweeper stopped");
    }
}

/// Delete expired sessions every `every` until cancelled. The first pass
/// runs one interval after start.
pub async fn run_session_sweep(sessions: SessionManager, every: Duration, cancel: CancellationToken) {
    let mut interval = interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let sweep = sessions.clone();
        match tokio::task::spawn_blocking(move || sweep.sweep_expired()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => info!("Session sweep: removed {} expired sessions", count),
            Ok(Err(e)) => warn!("Session sweep error: {}", e),
            Err(e) => warn!("Session sweep task failed: {}", e),
        }
    }
    debug!("Session sweep stopped");
}

/// Evict idle rate-limit clients once per limiter window until cancelled.
pub async fn run_eviction_loop(limiter: Arc<RateLimiter>, cancel: CancellationToken) {
    let every = limiter.window();
    let mut interval = interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let evicted = limiter.evict_stale();
        if evicted > 0 {
            debug!("Rate limiter: evicted {} idle clients, {} tracked", evicted, limiter.len());
        }
    }
    debug!("Eviction loop stopped");
}
