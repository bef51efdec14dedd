//! Per-IP rate limiting for the API routes.
//!
//! Each limiter is a `governor` keyed token bucket: `max` requests may be spent at
//! once, and the bucket refills evenly over `window`. Clients are keyed by the
//! connection peer address. `X-Forwarded-For` is only honoured when the limiter is
//! told it sits behind a trusted proxy, since any client can set that header.
//! Buckets that have fully refilled are dropped every [`PRUNE_EVERY`] checks.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::routes::error::ErrorResponse;

pub const PRUNE_EVERY: u64 = 1024;

#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    checks: Arc<AtomicU64>,
    trust_proxy: bool,
    message: &'static str,
}

impl IpRateLimiter {
    pub fn new(max: u32, window: Duration, message: &'static str) -> Self {
        let burst = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
        let quota = window
            .checked_div(burst.get())
            .and_then(Quota::with_period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            checks: Arc::new(AtomicU64::new(0)),
            trust_proxy: false,
            message,
        }
    }

    /// Key clients by the first `X-Forwarded-For` entry instead of the peer address.
    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        let allowed = self.limiter.check_key(&ip).is_ok();
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
        allowed
    }

    /// Forget clients whose bucket is full again.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

pub async fn enforce(
    State(limiter): State<IpRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request, limiter.trust_proxy);

    if !limiter.check(ip) {
        warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
        return ErrorResponse::new(StatusCode::TOO_MANY_REQUESTS, limiter.message).into_response();
    }

    debug!(%ip, "Rate limit check passed");
    next.run(request).await
}

fn client_ip(request: &Request<Body>, trust_proxy: bool) -> IpAddr {
    let forwarded = trust_proxy
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limiter = IpRateLimiter::new(3, Duration::from_secs(900), "slow down");
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(900), "slow down");
        assert!(limiter.check("10.0.0.1".parse().unwrap()));
        assert!(!limiter.check("10.0.0.1".parse().unwrap()));
        assert!(limiter.check("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_header_only_behind_trusted_proxy() {
        let mut request = Request::builder()
            .uri("/api/images")
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));

        assert_eq!(
            client_ip(&request, false),
            "192.168.1.2".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            client_ip(&request, true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_refilled_buckets_are_pruned() {
        let limiter = IpRateLimiter::new(1, Duration::from_millis(10), "slow down");
        for i in 0..50u8 {
            limiter.check(IpAddr::V4(Ipv4Addr::new(10, 1, 0, i)));
        }
        assert_eq!(limiter.tracked_clients(), 50);

        std::thread::sleep(Duration::from_millis(50));
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_exhausted_buckets_survive_pruning() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(900), "slow down");
        let ip: IpAddr = "10.0.0.9".parse().unwrap();
        assert!(limiter.check(ip));
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(!limiter.check(ip));
    }

    #[test]
    fn test_falls_back_to_peer_address() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request, true), IpAddr::V4(Ipv4Addr::LOCALHOST));

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));
        assert_eq!(
            client_ip(&request, true),
            "192.168.1.2".parse::<IpAddr>().unwrap()
        );
    }
}
