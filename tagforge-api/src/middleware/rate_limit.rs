//! Global per-IP flood limiter.
//!
//! Independent of the build dispatch quota: this one protects every route
//! from bursts and runs before any handler.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use tokio::task::JoinHandle;

use super::client_ip::client_ip;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::telemetry::metrics::with_metrics;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    /// Per-IP limiters
    limiters: Arc<DashMap<IpAddr, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn burst(&self) -> NonZeroU32 {
        NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN)
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry(ip)
            .or_insert_with(|| {
                let quota = Quota::per_minute(
                    NonZeroU32::new(self.config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
                )
                .allow_burst(self.burst());
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }

    /// Drop limiters whose bucket has refilled to the full burst.
    ///
    /// A full bucket is indistinguishable from a fresh limiter, so removing
    /// it changes no client's allowance. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let burst = self.burst();
        let before = self.limiters.len();
        self.limiters
            .retain(|_, limiter| !matches!(limiter.check_n(burst), Ok(Ok(_))));
        before.saturating_sub(self.limiters.len())
    }

    /// Number of client IPs with a limiter.
    pub fn tracked_clients(&self) -> usize {
        self.limiters.len()
    }
}

/// Periodically drop idle per-IP limiters so the map stays bounded by the
/// set of recently active clients.
pub fn spawn_limiter_pruner(state: RateLimitState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = state.prune_idle();
            let tracked = state.tracked_clients();
            with_metrics(|metrics| metrics.set_rate_limit_clients(tracked));
            if removed > 0 {
                tracing::debug!(removed, tracked, "Pruned idle rate limiters");
            }
        }
    })
}

/// Rejection returned when a client exceeds its request rate.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the client may retry
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Rate limiting middleware.
///
/// Keys on the client IP (see [`client_ip`]); requests without a socket
/// peer share the unspecified-address bucket. Rejected requests get
/// `429 Too Many Requests` with `Retry-After`.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let ip = client_ip(request.headers(), peer, state.config.trust_proxy_headers)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match state.limiter_for(ip).check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from_str(&state.config.rate_limit_per_minute.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("120")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::warn!(client = %ip, retry_after, "Request rate limited");
            Err(RateLimitError { retry_after })
        }
    }
}
