//! HTTP router, shared state and public handlers.
//!
//! Dashboard routes live in [`crate::dashboard`]; this module assembles them
//! with the public marketplace routes behind the access gate middleware.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::{Layer, Service};
use tower_http::services::ServeDir;

use crate::api::RemoteApi;
use crate::error::{ErrorContext, TutorlyError};
use crate::gate::{access_gate, AccessGate, LOGIN_PATH};
use crate::models::{Booking, BookingStatus, Category, NewBooking, TutorProfile, TutorQuery};
use crate::role::Role;
use crate::session::{clear_session_cookie, extract_session_token, SessionProvider};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Correlation id of the current request.
///
/// Set by [`RequestLoggingLayer`] and echoed in the `x-request-id` response
/// header, the request log line and every error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Error context for `operation` tagged with this id.
    pub fn context(&self, operation: &str) -> ErrorContext {
        ErrorContext::new(operation).with_request_id(self.0.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::generate))
    }
}

/// Request logging middleware layer
#[derive(Clone)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Logs every request with method, path, status and response time, and tags
/// the response with a request id.
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S> Service<Request> for RequestLoggingService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| RequestId::generate().0);
        req.extensions_mut().insert(RequestId(request_id.clone()));
        let start = std::time::Instant::now();

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let duration = start.elapsed();
            let status = response.status();

            tracing::info!(
                method = %method,
                path = %path,
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                request_id = %request_id,
                "HTTP request"
            );

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub api: RemoteApi,
    pub gate: Arc<AccessGate>,
    /// Session lookup for public routes that act on behalf of a caller.
    pub sessions: Arc<dyn SessionProvider>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with a request ID for tracking
    pub fn with_request_id(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: Some(request_id.into()),
        }
    }
}

/// Convert a [`TutorlyError`] into an API error, logging it with context.
///
/// The response carries a user-facing message only; details stay in the log
/// under the same request id.
pub fn handle_error(error: TutorlyError, context: ErrorContext) -> ApiError {
    error.log_with_context(&context);
    (
        error.status_code(),
        Json(ErrorResponse::with_request_id(
            error.user_message(),
            context.request_id,
        )),
    )
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_assets(state, None)
}

/// Router with an optional static asset directory served as fallback.
pub fn build_router_with_assets(state: AppState, public_dir: Option<&std::path::Path>) -> Router {
    let gate = state.gate.clone();

    let mut router = Router::new()
        .merge(crate::dashboard::routes())
        .route("/tutors", get(list_tutors))
        .route("/tutors/{id}", get(get_tutor))
        .route("/bookings", post(create_booking))
        .route("/categories", get(list_categories))
        .route("/login", get(login_page))
        .route("/logout", get(logout))
        .route("/health", get(crate::health::health_handler))
        .with_state(state);

    if let Some(dir) = public_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(axum::middleware::from_fn_with_state(gate, access_gate))
        .layer(RequestLoggingLayer)
}

// ========== Public handlers ==========

async fn list_tutors(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<TutorQuery>,
) -> Result<Json<Vec<TutorProfile>>, ApiError> {
    state
        .api
        .list_tutors(&query)
        .await
        .map(Json)
        .map_err(|e| handle_error(e, request_id.context("list_tutors")))
}

async fn get_tutor(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(tutor_id): Path<String>,
) -> Result<Json<TutorProfile>, ApiError> {
    state
        .api
        .get_tutor(&tutor_id)
        .await
        .map(Json)
        .map_err(|e| handle_error(e, request_id.context("get_tutor")))
}

async fn list_categories(
    State(state): State<AppState>,
    request_id: RequestId,
) -> Result<Json<Vec<Category>>, ApiError> {
    state
        .api
        .list_categories()
        .await
        .map(Json)
        .map_err(|e| handle_error(e, request_id.context("list_categories")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSessionRequest {
    pub tutor_profile_id: String,
    pub date_time: chrono::DateTime<chrono::Utc>,
}

/// Book a session with a tutor. Only students may book.
async fn create_booking(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    Json(request): Json<BookSessionRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let mut context = request_id.context("create_booking");

    let session = match state.sessions.resolve(&headers).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(handle_error(TutorlyError::Unauthenticated, context)),
        Err(e) => return Err(handle_error(e, context)),
    };
    context = context.with_user_id(session.user.id.clone());

    if session.role() != Some(Role::Student) {
        return Err(handle_error(
            TutorlyError::Forbidden(format!("role {} cannot book sessions", session.user.role)),
            context,
        ));
    }
    let Some(token) = extract_session_token(&headers, state.gate.cookie_name()) else {
        return Err(handle_error(TutorlyError::Unauthenticated, context));
    };
    if request.tutor_profile_id.trim().is_empty() {
        return Err(handle_error(
            TutorlyError::InvalidInput("tutorProfileId is required".to_string()),
            context,
        ));
    }

    let booking = NewBooking {
        tutor_profile_id: request.tutor_profile_id,
        date_time: request.date_time,
        status: BookingStatus::Confirmed,
    };
    match state.api.create_booking(&token, &booking).await {
        Ok(created) => {
            tracing::info!(
                booking_id = %created.id,
                tutor_profile_id = %booking.tutor_profile_id,
                user_id = %session.user.id,
                "Session booked"
            );
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(e) => Err(handle_error(e, context)),
    }
}

async fn login_page() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "page": "login",
        "message": "Sign in with the authentication provider to continue",
    }))
}

/// Reached only if `/logout` is removed from the protected set; the gate
/// normally answers it first.
async fn logout(State(state): State<AppState>) -> Response {
    let mut response = Redirect::temporary(LOGIN_PATH).into_response();
    match clear_session_cookie(state.gate.cookie_name(), state.gate.cookie_secure()) {
        Some(cookie) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        None => {
            tracing::error!(
                cookie = %state.gate.cookie_name(),
                "Session cookie name is not a valid header value"
            );
        }
    }
    response
}
