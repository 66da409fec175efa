use super::*;
use axum::http::HeaderMap;
use std::time::{Duration, Instant};

pub(super) const DEFAULT_API_RATE_LIMIT_PER_SEC: u32 = 180;
const MAX_TRACKED_CLIENTS: usize = 4096;

#[derive(Clone)]
pub(super) struct ApiSecurity {
    pub required_token: Option<String>,
    pub limiter: RateLimiter,
}

/// Fixed one-second windows per client key.
#[derive(Clone)]
pub(super) struct RateLimiter {
    per_sec: u32,
    windows: Arc<Mutex<HashMap<String, (Instant, u32)>>>,
}

impl RateLimiter {
    pub(super) fn new(per_sec: u32) -> Self {
        Self {
            per_sec: per_sec.max(1),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(super) fn admit(&self, key: &str, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(window.0) >= Duration::from_secs(1) {
            *window = (now, 0);
        }
        window.1 = window.1.saturating_add(1);
        let admitted = window.1 <= self.per_sec;
        if windows.len() > MAX_TRACKED_CLIENTS {
            windows.retain(|_, (start, _)| now.duration_since(*start) < Duration::from_secs(10));
        }
        admitted
    }
}

impl ApiSecurity {
    pub(super) fn from_env() -> Self {
        let required_token = std::env::var("CELLBLOCK_API_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let per_sec = std::env::var("CELLBLOCK_API_RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_API_RATE_LIMIT_PER_SEC);
        Self {
            required_token,
            limiter: RateLimiter::new(per_sec),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.required_token.as_deref() else {
            return true;
        };
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .unwrap_or("")
        };
        let auth = header("authorization");
        let bearer = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .unwrap_or(auth);
        bearer == expected || header("x-api-key") == expected
    }
}

fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
        .to_string()
}

pub(super) async fn api_guard(
    State(security): State<ApiSecurity>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    if !security.authorized(req.headers()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::err(
                "Unauthorized: send Authorization: Bearer <CELLBLOCK_API_TOKEN>",
            )),
        )
            .into_response();
    }
    if !security
        .limiter
        .admit(&client_key(req.headers()), Instant::now())
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::err("Rate limit exceeded")),
        )
            .into_response();
    }
    next.run(req).await
}
