use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::ApiError;

/// Counter state for one client.
#[derive(Debug)]
struct ClientWindow {
    window_start: Instant,
    request_count: u32,
}

/// Fixed-window request counter keyed by client (network origin).
///
/// A window opens on a client's first request and admits `max_requests`
/// until `window` has passed; the next request after that opens a fresh
/// window. Denied requests still count and do not reset the window. A burst
/// straddling a window boundary can therefore pass up to twice
/// `max_requests` in a short span.
///
/// The table lock is only held to find or insert a client's entry; the
/// counter itself sits behind that client's own mutex, so a busy client
/// never blocks the others.
pub struct RateLimiter {
    clients: RwLock<HashMap<String, Arc<Mutex<ClientWindow>>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `client_key` and report whether it is admitted.
    pub fn allow(&self, client_key: &str) -> bool {
        let entry = self.entry(client_key);
        let mut state = entry.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if now.duration_since(state.window_start) > self.window {
            state.window_start = now;
            state.request_count = 1;
            return true;
        }

        state.request_count = state.request_count.saturating_add(1);
        if state.request_count > self.max_requests {
            debug!(
                "Rate limit hit for {} ({}/{})",
                client_key, state.request_count, self.max_requests
            );
            return false;
        }
        true
    }

    pub fn check(&self, client_key: &str) -> Result<(), ApiError> {
        if self.allow(client_key) {
            Ok(())
        } else {
            Err(ApiError::TooManyRequests)
        }
    }

    /// Drop clients whose window opened more than two windows ago.
    /// Returns how many entries were removed.
    pub fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let idle_limit = self.window * 2;

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, entry| {
            let state = entry.lock().unwrap_or_else(PoisonError::into_inner);
            now.duration_since(state.window_start) <= idle_limit
        });
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, client_key: &str) -> Arc<Mutex<ClientWindow>> {
        if let Some(entry) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client_key)
        {
            return entry.clone();
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(client_key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ClientWindow {
                    window_start: Instant::now(),
                    request_count: 0,
                }))
            })
            .clone()
    }
}

/// Rate-limit key for a peer: its IP address, port dropped.
pub fn client_key(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn admits_exactly_max_then_denies() {
        let limiter = RateLimiter::new(20, Duration::from_secs(60));

        for i in 0..20 {
            assert!(limiter.allow("10.0.0.1"), "request {} should pass", i + 1);
        }
        assert!(!limiter.allow("10.0.0.1"));
        assert!(matches!(limiter.check("10.0.0.1"), Err(ApiError::TooManyRequests)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_after_window_elapses() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.allow("a"));
        }
        assert!(!limiter.allow("a"));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!limiter.allow("a"), "denial must not reset the window");

        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_burst_admits_up_to_twice_max() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));

        let mut admitted = 0;
        for _ in 0..5 {
            admitted += limiter.allow("edge") as u32;
        }
        tokio::time::advance(Duration::from_millis(1001)).await;
        for _ in 0..5 {
            admitted += limiter.allow("edge") as u32;
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_drops_clients_idle_for_two_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        limiter.allow("old");

        tokio::time::advance(Duration::from_millis(1500)).await;
        limiter.allow("recent");
        assert_eq!(limiter.evict_stale(), 0);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(limiter.evict_stale(), 1);
        assert_eq!(limiter.len(), 1);

        // A returning client starts from scratch.
        assert!(limiter.allow("old"));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn busy_client_does_not_affect_another() {
        let limiter = RateLimiter::new(20, Duration::from_secs(1));
        let a_permits = AtomicUsize::new(0);
        let a_denials = AtomicUsize::new(0);
        let b_permits = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..5 {
                s.spawn(|| {
                    for _ in 0..5 {
                        if limiter.allow("A") {
                            a_permits.fetch_add(1, Ordering::Relaxed);
                        } else {
                            a_denials.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..5 {
                        if limiter.allow("B") {
                            b_permits.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(a_permits.load(Ordering::Relaxed), 20);
        assert_eq!(a_denials.load(Ordering::Relaxed), 5);
        assert_eq!(b_permits.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn client_key_ignores_port() {
        let a: SocketAddr = "192.168.1.7:50001".parse().unwrap();
        let b: SocketAddr = "192.168.1.7:50002".parse().unwrap();
        let v6: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(client_key(&a), client_key(&b));
        assert_eq!(client_key(&a), "192.168.1.7");
        assert_eq!(client_key(&v6), "::1");
    }
}
