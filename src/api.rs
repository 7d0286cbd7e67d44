//! HTTP surface: `GET /` and `GET /health` for liveness, `GET /check?model=` for verdicts.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classifier::Verdict;
use crate::error::CheckError;
use crate::pipeline::{Health, Pipeline};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    rate_limiter: Option<RateLimiter>,
}

impl AppState {
    /// Wraps a pipeline; `rate_limiter` of `None` disables limiting.
    pub fn new(pipeline: Arc<Pipeline>, rate_limiter: Option<RateLimiter>) -> Self {
        Self {
            pipeline,
            rate_limiter,
        }
    }
}

/// Query string accepted by `/check`.
#[derive(Debug, Deserialize)]
pub struct CheckParams {
    #[serde(default)]
    model: Option<String>,
}

/// Error payload for non-verdict responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    message: String,
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/check", get(check))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(state.pipeline.health())
}

async fn check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<Verdict>, Response> {
    if let Some(limiter) = &state.rate_limiter {
        if let Err(wait) = limiter.try_acquire().await {
            debug!(retry_after_ms = wait.as_millis() as u64, "check throttled");
            return Err(too_many_requests(wait));
        }
    }
    let model = params.model.unwrap_or_default();
    match state.pipeline.check(&model).await {
        Ok(verdict) => Ok(Json(verdict)),
        Err(CheckError::InvalidInput(message)) => Err(bad_request(message).into_response()),
        Err(err) => {
            warn!(error = %err, "unexpected check failure");
            Ok(Json(Verdict::no_evidence(&model, err.to_string())))
        }
    }
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn too_many_requests(wait: Duration) -> Response {
    let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        Json(ErrorBody {
            message: "rate limit exceeded".to_string(),
        }),
    )
        .into_response()
}

/// Request budget for `/check`: sustained rate plus an instant burst allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Sustained requests per minute.
    pub per_minute: u32,
    /// Requests admitted back to back before throttling starts.
    pub burst: u32,
}

/// Token bucket guarding `/check`.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Returns `None` when either half of `limit` is zero (limiting disabled).
    pub fn new(limit: RateLimit) -> Option<Self> {
        if limit.per_minute == 0 || limit.burst == 0 {
            return None;
        }
        let capacity = f64::from(limit.burst);
        Some(Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            })),
            capacity,
            refill_per_sec: f64::from(limit.per_minute) / 60.0,
        })
    }

    /// Admits one check, or reports how long until the next token frees up.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.refilled_at = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - bucket.tokens;
        Err(Duration::from_secs_f64(missing / self.refill_per_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimit { per_minute, burst }).expect("limiter")
    }

    #[test]
    fn zero_knobs_disable_limiting() {
        assert!(RateLimiter::new(RateLimit { per_minute: 0, burst: 5 }).is_none());
        assert!(RateLimiter::new(RateLimit { per_minute: 60, burst: 0 }).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_exhausted_then_refilled() {
        let limiter = limiter(30, 2);
        assert_eq!(limiter.try_acquire().await, Ok(()));
        assert_eq!(limiter.try_acquire().await, Ok(()));
        assert_eq!(limiter.try_acquire().await, Err(Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.try_acquire().await, Ok(()));
        assert!(limiter.try_acquire().await.is_err());
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let response = too_many_requests(Duration::from_millis(1200));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = too_many_requests(Duration::from_millis(10));
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
