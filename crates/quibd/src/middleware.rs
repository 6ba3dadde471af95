//! Request middleware: body size cap and dual-tier rate limiting.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Maximum request body size: 64 KiB.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Burst tier: 20 requests in 10 seconds.
pub const RATE_LIMIT_BURST_REQUESTS: usize = 20;
pub const RATE_LIMIT_BURST_WINDOW: Duration = Duration::from_secs(10);

/// Sustained tier: 100 requests per minute.
pub const RATE_LIMIT_SUSTAINED_REQUESTS: usize = 100;
pub const RATE_LIMIT_SUSTAINED_WINDOW: Duration = Duration::from_secs(60);

type RequestLog = Arc<RwLock<HashMap<String, Vec<Instant>>>>;

/// In-process rate limiter tracking request timestamps per peer address
/// and per bearer token.
#[derive(Clone, Default)]
pub struct RateLimiter {
    peer_requests: RequestLog,
    token_requests: RequestLog,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `key` in `log` and report whether it is
    /// still inside both tiers.
    async fn check(log: &RequestLog, key: &str, scope: &str) -> bool {
        let mut requests = log.write().await;
        let timestamps = requests.entry(key.to_string()).or_default();
        let now = Instant::now();

        let burst = timestamps
            .iter()
            .filter(|&&t| now.duration_since(t) < RATE_LIMIT_BURST_WINDOW)
            .count();
        if burst >= RATE_LIMIT_BURST_REQUESTS {
            warn!(
                "{} burst rate limit exceeded for {} ({}/{})",
                scope, key, burst, RATE_LIMIT_BURST_REQUESTS
            );
            return false;
        }

        let sustained = timestamps
            .iter()
            .filter(|&&t| now.duration_since(t) < RATE_LIMIT_SUSTAINED_WINDOW)
            .count();
        if sustained >= RATE_LIMIT_SUSTAINED_REQUESTS {
            warn!(
                "{} sustained rate limit exceeded for {} ({}/{})",
                scope, key, sustained, RATE_LIMIT_SUSTAINED_REQUESTS
            );
            return false;
        }

        timestamps.retain(|&t| now.duration_since(t) < RATE_LIMIT_SUSTAINED_WINDOW);
        timestamps.push(now);
        true
    }

    pub async fn check_peer_rate_limit(&self, peer_addr: &str) -> bool {
        Self::check(&self.peer_requests, peer_addr, "Peer").await
    }

    pub async fn check_token_rate_limit(&self, token: &str) -> bool {
        Self::check(&self.token_requests, &Self::mask_token(token), "Token").await
    }

    /// Drop entries with no requests inside the sustained window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut active = [0usize; 2];

        for (i, log) in [&self.peer_requests, &self.token_requests].iter().enumerate() {
            let mut requests = log.write().await;
            requests.retain(|_, timestamps| {
                timestamps.retain(|&t| now.duration_since(t) < RATE_LIMIT_SUSTAINED_WINDOW);
                !timestamps.is_empty()
            });
            active[i] = requests.len();
        }

        debug!(
            "Rate limiter cleanup: {} active peers, {} active tokens",
            active[0], active[1]
        );
    }

    /// First 8 characters only; tokens never hit the logs whole.
    fn mask_token(token: &str) -> String {
        if token.len() > 8 {
            format!("{}...", &token[..8])
        } else {
            "***".to_string()
        }
    }

    #[cfg(test)]
    async fn tracked_peers(&self) -> usize {
        self.peer_requests.read().await.len()
    }
}

/// Reject requests whose declared Content-Length exceeds MAX_BODY_SIZE.
pub async fn body_size_limit(
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(length) = request
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > MAX_BODY_SIZE {
            warn!("Request body too large: {} bytes (max {})", length, MAX_BODY_SIZE);
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }
    Ok(next.run(request).await)
}

/// Enforce rate limits per peer address and, when an Authorization
/// header is present, per token.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let peer_addr = extract_peer_addr(&request);

    if !rate_limiter.check_peer_rate_limit(&peer_addr).await {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    if let Some(token) = extract_auth_token(&request) {
        if !rate_limiter.check_token_rate_limit(&token).await {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(request).await)
}

/// Peer address from X-Forwarded-For (first hop) when present.
fn extract_peer_addr(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_auth_token(request: &Request<Body>) -> Option<String> {
    let auth = request.headers().get("authorization")?.to_str().ok()?;
    Some(auth.strip_prefix("Bearer ").unwrap_or(auth).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_burst_limit() {
        let limiter = RateLimiter::new();

        for i in 1..=RATE_LIMIT_BURST_REQUESTS {
            assert!(
                limiter.check_peer_rate_limit("127.0.0.1").await,
                "request {} should pass",
                i
            );
        }
        assert!(!limiter.check_peer_rate_limit("127.0.0.1").await);

        // A different peer is unaffected.
        assert!(limiter.check_peer_rate_limit("127.0.0.2").await);
    }

    #[tokio::test]
    async fn token_burst_limit() {
        let limiter = RateLimiter::new();

        for _ in 0..RATE_LIMIT_BURST_REQUESTS {
            assert!(limiter.check_token_rate_limit("test-token-123").await);
        }
        assert!(!limiter.check_token_rate_limit("test-token-123").await);
        assert!(limiter.check_token_rate_limit("test-token-456").await);
    }

    #[tokio::test]
    async fn cleanup_keeps_recent_entries() {
        let limiter = RateLimiter::new();

        for i in 0..5 {
            limiter
                .check_peer_rate_limit(&format!("127.0.0.{}", i))
                .await;
        }
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_peers().await, 5);
    }

    #[tokio::test]
    async fn cleanup_does_not_reset_active_limits() {
        let limiter = RateLimiter::new();

        for _ in 0..RATE_LIMIT_BURST_REQUESTS {
            assert!(limiter.check_peer_rate_limit("10.0.0.1").await);
        }
        assert!(!limiter.check_peer_rate_limit("10.0.0.1").await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        limiter.cleanup().await;

        // Burst window is 10s; still limited.
        assert!(!limiter.check_peer_rate_limit("10.0.0.1").await);
    }

    #[test]
    fn mask_token_hides_short_tokens() {
        assert_eq!(RateLimiter::mask_token("short"), "***");
        assert_eq!(RateLimiter::mask_token("12345678"), "***");
        assert_eq!(RateLimiter::mask_token("1234567890abcdef"), "12345678...");
    }
}
