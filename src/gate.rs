//! Role-based access gate for dashboard traffic.
//!
//! Every request matching a protected path pattern passes through
//! [`AccessGate::evaluate`] before reaching its handler. The gate is
//! stateless: a decision is a function of the path and the resolved session.
//!
//! Rules, first match wins:
//! 1. `/logout` clears the session cookie and redirects to `/login`, without
//!    consulting the session provider.
//! 2. No session, a failed lookup, or a role outside the known set
//!    redirects to `/login`.
//! 3. A role asking for another role's dashboard is redirected to its own.
//! 4. Anything else is allowed.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::matcher::ProtectedPaths;
use crate::role::Role;
use crate::session::{
    clear_session_cookie, extract_session_token, CurrentSession, SessionProvider,
};

pub const LOGIN_PATH: &str = "/login";
pub const LOGOUT_PATH: &str = "/logout";

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to the handler with the caller's session.
    Allow(CurrentSession),
    /// Send the caller elsewhere.
    Redirect(String),
    /// Expire the session cookie, then send the caller elsewhere.
    ClearSessionAndRedirect(String),
}

/// Pure decision table for an authenticated caller.
pub fn decide_for_role(path: &str, role: Role) -> Option<String> {
    if role.is_foreign_dashboard(path) {
        Some(role.dashboard().to_string())
    } else {
        None
    }
}

/// The access gate: protected path set, session provider and cookie policy.
pub struct AccessGate {
    provider: Arc<dyn SessionProvider>,
    protected: ProtectedPaths,
    cookie_name: String,
    cookie_secure: bool,
}

impl AccessGate {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        protected: ProtectedPaths,
        cookie_name: impl Into<String>,
        cookie_secure: bool,
    ) -> Self {
        Self {
            provider,
            protected,
            cookie_name: cookie_name.into(),
            cookie_secure,
        }
    }

    /// Whether requests for `path` go through the gate at all.
    pub fn protects(&self, path: &str) -> bool {
        self.protected.matches(path)
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// Decide what happens to a request for `path` carrying `headers`.
    pub async fn evaluate(&self, path: &str, headers: &HeaderMap) -> Decision {
        if path == LOGOUT_PATH {
            tracing::debug!(path = %path, "Logout requested, clearing session");
            return Decision::ClearSessionAndRedirect(LOGIN_PATH.to_string());
        }

        let token = extract_session_token(headers, &self.cookie_name);
        let fingerprint = token.as_ref().map(|t| t.fingerprint());

        let session = match self.provider.resolve(headers).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(path = %path, token = ?fingerprint, "No session");
                return Decision::Redirect(LOGIN_PATH.to_string());
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path,
                    token = ?fingerprint,
                    "Session lookup failed, treating caller as unauthenticated"
                );
                return Decision::Redirect(LOGIN_PATH.to_string());
            }
        };

        let Some(role) = session.role() else {
            tracing::warn!(
                path = %path,
                user_id = %session.user.id,
                role = %session.user.role,
                "Session carries unknown role, treating caller as unauthenticated"
            );
            return Decision::Redirect(LOGIN_PATH.to_string());
        };

        if let Some(home) = decide_for_role(path, role) {
            tracing::debug!(
                path = %path,
                role = %role,
                location = %home,
                "Foreign dashboard, redirecting to own"
            );
            return Decision::Redirect(home);
        }

        tracing::debug!(path = %path, role = %role, user_id = %session.user.id, "Allowed");
        Decision::Allow(CurrentSession {
            user: session.user,
            role,
            token,
        })
    }

    /// Turn a non-allow decision into an HTTP response.
    fn respond(&self, decision: Decision) -> Option<Response> {
        match decision {
            Decision::Allow(_) => None,
            Decision::Redirect(location) => Some(Redirect::temporary(&location).into_response()),
            Decision::ClearSessionAndRedirect(location) => {
                let mut response = Redirect::temporary(&location).into_response();
                match clear_session_cookie(&self.cookie_name, self.cookie_secure) {
                    Some(cookie) => {
                        response.headers_mut().append(header::SET_COOKIE, cookie);
                    }
                    None => {
                        tracing::error!(
                            cookie = %self.cookie_name,
                            "Session cookie name is not a valid header value"
                        );
                    }
                }
                Some(response)
            }
        }
    }
}

/// Axum middleware applying the gate to protected paths.
///
/// On allow, the caller's [`CurrentSession`] is inserted into request
/// extensions for the handler to extract.
pub async fn access_gate(
    State(gate): State<Arc<AccessGate>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !gate.protects(&path) {
        return next.run(req).await;
    }

    let decision = gate.evaluate(&path, req.headers()).await;
    if let Decision::Allow(current) = decision {
        req.extensions_mut().insert(current);
        return next.run(req).await;
    }

    gate.respond(decision)
        .unwrap_or_else(|| Redirect::temporary(LOGIN_PATH).into_response())
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{Result, TutorlyError};
    use crate::session::{Session, SessionProvider, SessionUser};

    /// Provider returning a fixed answer and counting lookups.
    pub struct FixedProvider {
        answer: std::result::Result<Option<String>, String>,
        pub calls: AtomicUsize,
    }

    impl FixedProvider {
        pub fn role(role: &str) -> Self {
            Self {
                answer: Ok(Some(role.to_string())),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn anonymous() -> Self {
            Self {
                answer: Ok(None),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                answer: Err("connection refused".to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionProvider for FixedProvider {
        async fn resolve(&self, _headers: &HeaderMap) -> Result<Option<Session>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Ok(Some(role)) => Ok(Some(Session {
                    user: SessionUser {
                        id: "user-1".to_string(),
                        name: "Test User".to_string(),
                        email: "test@example.com".to_string(),
                        role: role.clone(),
                        image: None,
                        status: None,
                    },
                    expires_at: None,
                })),
                Ok(None) => Ok(None),
                Err(e) => Err(TutorlyError::SessionResolution(e.clone())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedProvider;
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn gate_with(provider: Arc<FixedProvider>) -> AccessGate {
        AccessGate::new(
            provider,
            ProtectedPaths::default(),
            "better-auth.session_token",
            false,
        )
    }

    async fn decide(provider: FixedProvider, path: &str) -> Decision {
        gate_with(Arc::new(provider))
            .evaluate(path, &HeaderMap::new())
            .await
    }

    fn redirect(to: &str) -> Decision {
        Decision::Redirect(to.to_string())
    }

    #[tokio::test]
    async fn student_sent_away_from_admin_pages() {
        let decision = decide(FixedProvider::role("STUDENT"), "/admin-dashboard/users").await;
        assert_eq!(decision, redirect("/student-dashboard"));
    }

    #[tokio::test]
    async fn student_allowed_on_own_dashboard() {
        let decision = decide(FixedProvider::role("STUDENT"), "/student-dashboard").await;
        match decision {
            Decision::Allow(current) => {
                assert_eq!(current.role, Role::Student);
                assert_eq!(current.user.id, "user-1");
            }
            other => panic!("expected allow, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn anonymous_redirected_to_login() {
        let decision = decide(FixedProvider::anonymous(), "/tutor-dashboard/MyBooking").await;
        assert_eq!(decision, redirect("/login"));
    }

    #[tokio::test]
    async fn logout_clears_session_for_admin() {
        let provider = Arc::new(FixedProvider::role("ADMIN"));
        let decision = gate_with(provider.clone())
            .evaluate("/logout", &HeaderMap::new())
            .await;
        assert_eq!(
            decision,
            Decision::ClearSessionAndRedirect("/login".to_string())
        );
        assert_eq!(provider.calls(), 0, "logout must not resolve the session");
    }

    #[tokio::test]
    async fn logout_clears_session_without_session() {
        let decision = decide(FixedProvider::anonymous(), "/logout").await;
        assert_eq!(
            decision,
            Decision::ClearSessionAndRedirect("/login".to_string())
        );
        let decision = decide(FixedProvider::failing(), "/logout").await;
        assert_eq!(
            decision,
            Decision::ClearSessionAndRedirect("/login".to_string())
        );
    }

    #[tokio::test]
    async fn admin_allowed_on_admin_dashboard() {
        let decision = decide(FixedProvider::role("ADMIN"), "/admin-dashboard").await;
        assert!(matches!(decision, Decision::Allow(ref c) if c.role == Role::Admin));
    }

    #[tokio::test]
    async fn tutor_redirects() {
        assert_eq!(
            decide(FixedProvider::role("TUTOR"), "/student-dashboard/MyBookings").await,
            redirect("/tutor-dashboard")
        );
        assert_eq!(
            decide(FixedProvider::role("TUTOR"), "/admin-dashboard").await,
            redirect("/tutor-dashboard")
        );
    }

    #[tokio::test]
    async fn admin_redirects() {
        assert_eq!(
            decide(FixedProvider::role("ADMIN"), "/student-dashboard").await,
            redirect("/admin-dashboard")
        );
        assert_eq!(
            decide(FixedProvider::role("ADMIN"), "/tutor-dashboard/MyBooking").await,
            redirect("/admin-dashboard")
        );
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed() {
        let decision = decide(FixedProvider::failing(), "/admin-dashboard").await;
        assert_eq!(decision, redirect("/login"));
    }

    #[tokio::test]
    async fn unknown_role_fails_closed() {
        let decision = decide(FixedProvider::role("SUPERUSER"), "/admin-dashboard").await;
        assert_eq!(decision, redirect("/login"));
        let decision = decide(FixedProvider::role("student"), "/student-dashboard").await;
        assert_eq!(decision, redirect("/login"));
    }

    #[tokio::test]
    async fn prefix_inheritance() {
        let root = decide(FixedProvider::role("STUDENT"), "/tutor-dashboard").await;
        let nested = decide(FixedProvider::role("STUDENT"), "/tutor-dashboard/MyBooking").await;
        assert_eq!(root, nested);
    }

    #[tokio::test]
    async fn evaluate_is_idempotent() {
        let gate = gate_with(Arc::new(FixedProvider::role("TUTOR")));
        let headers = HeaderMap::new();
        for path in ["/tutor-dashboard", "/admin-dashboard/x", "/logout"] {
            let first = gate.evaluate(path, &headers).await;
            let second = gate.evaluate(path, &headers).await;
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn allow_carries_token_from_cookie() {
        let gate = gate_with(Arc::new(FixedProvider::role("STUDENT")));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "better-auth.session_token=tok123".parse().unwrap(),
        );
        match gate.evaluate("/student-dashboard", &headers).await {
            Decision::Allow(current) => {
                assert_eq!(current.token.unwrap().expose(), "tok123");
            }
            other => panic!("expected allow, got {:?}", other),
        }
    }

    fn app(provider: Arc<FixedProvider>) -> Router {
        let gate = Arc::new(gate_with(provider));
        Router::new()
            .route(
                "/student-dashboard",
                get(|Extension(current): Extension<CurrentSession>| async move {
                    format!("hello {}", current.role)
                }),
            )
            .route("/tutors", get(|| async { "public" }))
            .route("/logout", get(|| async { "unreachable" }))
            .layer(axum::middleware::from_fn_with_state(gate, access_gate))
    }

    async fn send(router: Router, path: &str) -> Response {
        router
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn middleware_allows_and_injects_session() {
        let response = send(
            app(Arc::new(FixedProvider::role("STUDENT"))),
            "/student-dashboard",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello STUDENT");
    }

    #[tokio::test]
    async fn middleware_redirects_anonymous() {
        let response = send(app(Arc::new(FixedProvider::anonymous())), "/student-dashboard").await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn middleware_bypasses_public_paths() {
        let provider = Arc::new(FixedProvider::anonymous());
        let response = send(app(provider.clone()), "/tutors").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn middleware_logout_sets_expiring_cookie() {
        let response = send(app(Arc::new(FixedProvider::role("ADMIN"))), "/logout").await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("better-auth.session_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Path=/"));
    }
}
