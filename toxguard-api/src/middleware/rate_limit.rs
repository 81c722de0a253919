//! Fixed-window rate limiting per client IP
//!
//! Each client gets `max` requests per window; the window starts with the
//! client's first request and resets once it has elapsed. Requests over the
//! cap get a 429 and never reach a handler.

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Prune expired windows once the table grows past this many clients, at
/// most once per window length
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { reset_after: Duration },
}

#[derive(Debug)]
struct ClientTable {
    windows: HashMap<IpAddr, Window>,
    next_prune: Instant,
}

/// Per-client request counters
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max: u32,
    clients: Mutex<ClientTable>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            clients: Mutex::new(ClientTable {
                windows: HashMap::new(),
                next_prune: Instant::now(),
            }),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Count a request from `client` now
    pub fn check(&self, client: IpAddr) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Count a request from `client` at `now`
    pub fn check_at(&self, client: IpAddr, now: Instant) -> RateDecision {
        let mut table = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let ClientTable {
            windows,
            next_prune,
        } = &mut *table;

        if windows.len() > PRUNE_THRESHOLD && now >= *next_prune {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
            *next_prune = now + window;
            debug!("Rate limiter pruned to {} clients", windows.len());
        }

        let entry = windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));

        if entry.count >= self.max {
            return RateDecision::Limited { reset_after };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.max - entry.count,
            reset_after,
        }
    }
}

/// Tower layer applying a [`FixedWindowLimiter`] to every request
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<FixedWindowLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Tower service that counts requests and rejects those over the cap
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
}

impl<S> Service<Request> for RateLimitMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Swap in a fresh clone so the instance that was polled ready serves this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let client = client_ip(&request);
        let limit = self.limiter.max();
        let decision = self.limiter.check(client);

        Box::pin(async move {
            match decision {
                RateDecision::Limited { reset_after } => {
                    warn!("Rate limit exceeded for {}", client);
                    let retry_after_secs = ceil_secs(reset_after);
                    let mut response = ApiError::RateLimited { retry_after_secs }.into_response();
                    set_rate_headers(&mut response, limit, 0, retry_after_secs);
                    Ok(response)
                }
                RateDecision::Allowed {
                    remaining,
                    reset_after,
                } => {
                    debug!("{} requests left for {}", remaining, client);
                    let mut response = inner.call(request).await?;
                    set_rate_headers(&mut response, limit, remaining, ceil_secs(reset_after));
                    Ok(response)
                }
            }
        })
    }
}

/// Peer address from the connection; requests without one share a bucket
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn set_rate_headers(response: &mut Response, limit: u32, remaining: u32, reset_secs: u64) {
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_up_to_max_then_limits() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 3);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            match limiter.check_at(ip(1), now) {
                RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, expected_remaining),
                other => panic!("expected allowed, got {:?}", other),
            }
        }
        assert!(matches!(limiter.check_at(ip(1), now), RateDecision::Limited { .. }));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert!(matches!(limiter.check_at(ip(1), now), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at(ip(1), now), RateDecision::Limited { .. }));
        assert!(matches!(limiter.check_at(ip(2), now), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_window_resets_after_elapsing() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();

        assert!(matches!(limiter.check_at(ip(1), start), RateDecision::Allowed { .. }));
        assert!(matches!(
            limiter.check_at(ip(1), start + Duration::from_secs(59)),
            RateDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at(ip(1), start + Duration::from_secs(60)),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_reset_after_counts_down() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 5);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        match limiter.check_at(ip(1), start + Duration::from_secs(20)) {
            RateDecision::Allowed { reset_after, .. } => {
                assert_eq!(reset_after, Duration::from_secs(40))
            }
            other => panic!("expected allowed, got {:?}", other),
        }
    }

    fn tracked_clients(limiter: &FixedWindowLimiter) -> usize {
        limiter.clients.lock().unwrap().windows.len()
    }

    fn ip_n(n: u32) -> IpAddr {
        IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + n))
    }

    fn late_client(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, last))
    }

    #[test]
    fn test_prunes_expired_clients_at_most_once_per_window() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();

        for n in 0..=PRUNE_THRESHOLD as u32 {
            limiter.check_at(ip_n(n), start);
        }
        assert_eq!(tracked_clients(&limiter), PRUNE_THRESHOLD + 1);

        // Over the threshold: prunes (nothing expired yet) and schedules the next prune
        limiter.check_at(late_client(250), start + Duration::from_secs(1));
        assert_eq!(tracked_clients(&limiter), PRUNE_THRESHOLD + 2);

        // Everything from `start` has expired, but the next prune is not due
        limiter.check_at(late_client(251), start + Duration::from_secs(60));
        assert_eq!(tracked_clients(&limiter), PRUNE_THRESHOLD + 3);

        limiter.check_at(late_client(252), start + Duration::from_secs(61));
        assert_eq!(tracked_clients(&limiter), 2);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
