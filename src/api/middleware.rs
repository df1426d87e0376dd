//! Bearer-token auth and per-client rate limiting for owner routes.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Default requests per client per minute when limiting is on.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Server security settings.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Shared secret clients send as `Authorization: Bearer <key>` (DAYLOG_API_KEY).
    pub api_key: Option<String>,
    /// Allowed browser origins (DAYLOG_CORS_ORIGINS, comma-separated). Permissive when unset.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    /// Read DAYLOG_API_KEY, DAYLOG_CORS_ORIGINS and DAYLOG_RATE_LIMIT.
    ///
    /// Rate limiting is switched on together with the API key, since an
    /// authenticated server is one reachable from outside the machine.
    pub fn from_env() -> Self {
        let api_key = std::env::var("DAYLOG_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let cors_origins = std::env::var("DAYLOG_CORS_ORIGINS").ok().map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        });

        let rate_limit = std::env::var("DAYLOG_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let rate_limiter = api_key
            .as_ref()
            .map(|_| RateLimiter::new(rate_limit, Duration::from_secs(60)));

        Self {
            api_key,
            cors_origins,
            rate_limiter,
        }
    }

    /// No auth, permissive CORS, no limiting.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
            rate_limiter: None,
        }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            cors_origins: Some(origins),
            ..Self::disabled()
        }
    }

    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, Duration::from_secs(60))),
            ..Self::disabled()
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Sliding-window request counter keyed by client address.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    requests: Arc<Mutex<HashMap<IpAddr, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a request from `ip`. Returns false once the window is full.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().expect("rate limiter lock poisoned");

        // Drop idle clients so the map doesn't grow without bound.
        requests.retain(|_, stamps| {
            stamps.retain(|&t| now.duration_since(t) < self.window);
            !stamps.is_empty()
        });

        let stamps = requests.entry(ip).or_default();
        if stamps.len() < self.max_requests as usize {
            stamps.push(now);
            true
        } else {
            false
        }
    }
}

pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &config.api_key else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Rejected request with invalid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Rejected request without bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = extract_client_ip(&request);

    if rate_limiter.check(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rate limit exceeded for {}", ip);
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Client address from proxy headers, falling back to loopback.
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    header("X-Forwarded-For")
        .and_then(|v| v.split(',').next().and_then(|ip| ip.trim().parse().ok()))
        .or_else(|| header("X-Real-IP").and_then(|v| v.trim().parse().ok()))
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
