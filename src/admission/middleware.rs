use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRef, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::{error, warn};

use crate::auth::cookies::TOKEN_COOKIE;
use crate::auth::dto::JwtKeys;
use crate::state::AppState;
use crate::users::repo::Role;

use super::gate::{policy_for, Decision, DenyReason, RequestProfile};

/// Runs every request through the admission service before any handler.
/// Denials short-circuit; an evaluation fault fails closed with a 500.
pub async fn admit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let identity = client_identity(&req);
    let role = resolve_role(&state, &req);
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let profile = RequestProfile {
        identity: &identity,
        role,
        path: &path,
        query: query.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    match state.admission.evaluate(&profile).await {
        Ok(Decision::Allow) => next.run(req).await,
        Ok(Decision::Deny(DenyReason::Bot)) => {
            warn!(ip = %identity, path = %path, "bot detected");
            reject(StatusCode::FORBIDDEN, "Access denied: Bot detected")
        }
        Ok(Decision::Deny(DenyReason::RateLimit)) => {
            let policy = policy_for(role);
            warn!(ip = %identity, path = %path, role = policy.label, "rate limit exceeded");
            reject(StatusCode::TOO_MANY_REQUESTS, policy.message)
        }
        Ok(Decision::Deny(DenyReason::Shield)) => {
            warn!(ip = %identity, path = %path, "shield triggered");
            reject(StatusCode::FORBIDDEN, "Access denied: Shield triggered")
        }
        Err(e) => {
            error!(error = ?e, ip = %identity, path = %path, "admission decision failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn reject(status: StatusCode, message: &'static str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Rate-limit identity: first X-Forwarded-For hop when present, else the
/// socket peer address.
fn client_identity(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A missing or unverifiable token cookie demotes the caller to guest.
fn resolve_role(state: &AppState, req: &Request) -> Option<Role> {
    let jar = CookieJar::from_headers(req.headers());
    let token = jar.get(TOKEN_COOKIE)?;
    let keys = JwtKeys::from_ref(state);
    keys.verify(token.value()).ok().map(|claims| claims.role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::gate::AdmissionService;
    use crate::app::build_app;
    use crate::users::repo::User;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn get(uri: &str, ip: &str, ua: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-forwarded-for", ip);
        if let Some(ua) = ua {
            builder = builder.header(header::USER_AGENT, ua);
        }
        builder.body(Body::empty()).expect("request")
    }

    fn token_for(state: &AppState, role: Role) -> String {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: 42,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "irrelevant".into(),
            role,
            created_at: now,
            updated_at: now,
        };
        JwtKeys::from_ref(state).sign(&user).expect("sign")
    }

    #[tokio::test]
    async fn bot_request_is_rejected_with_403() {
        let app = build_app(AppState::fake());
        let response = app
            .oneshot(get("/api/health", "203.0.113.9", Some("curl/8.4.0")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Access denied: Bot detected");
    }

    #[tokio::test]
    async fn guest_is_limited_to_five_per_minute() {
        let app = build_app(AppState::fake());
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(get("/api/health", "198.51.100.20", Some(BROWSER_UA)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .oneshot(get("/api/health", "198.51.100.20", Some(BROWSER_UA)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "Guest request limit exceeded (5 requests per minute)."
        );
    }

    #[tokio::test]
    async fn authenticated_user_gets_ten_requests() {
        let state = AppState::fake();
        let token = token_for(&state, Role::User);
        let app = build_app(state);

        for i in 0..11 {
            let mut request = get("/api/health", "198.51.100.21", Some(BROWSER_UA));
            request.headers_mut().insert(
                header::COOKIE,
                format!("token={token}").parse().expect("cookie header"),
            );
            let response = app.clone().oneshot(request).await.unwrap();
            if i < 10 {
                assert_eq!(response.status(), StatusCode::OK, "request {i} admitted");
            } else {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
                let body = body_json(response).await;
                assert_eq!(
                    body["message"],
                    "User request limit exceeded (10 requests per minute)."
                );
            }
        }
    }

    #[tokio::test]
    async fn admin_is_admitted_where_a_user_would_be_limited() {
        let state = AppState::fake();
        let token = token_for(&state, Role::Admin);
        let app = build_app(state);

        for _ in 0..11 {
            let mut request = get("/api/health", "198.51.100.22", Some(BROWSER_UA));
            request.headers_mut().insert(
                header::COOKIE,
                format!("token={token}").parse().expect("cookie header"),
            );
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn garbage_token_downgrades_to_guest_limits() {
        let app = build_app(AppState::fake());
        for i in 0..6 {
            let mut request = get("/api/health", "198.51.100.23", Some(BROWSER_UA));
            request
                .headers_mut()
                .insert(header::COOKIE, "token=not-a-jwt".parse().expect("header"));
            let response = app.clone().oneshot(request).await.unwrap();
            if i < 5 {
                assert_eq!(response.status(), StatusCode::OK);
            } else {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }
    }

    #[tokio::test]
    async fn shield_pattern_is_rejected_with_403() {
        let app = build_app(AppState::fake());
        let response = app
            .oneshot(get(
                "/api/health?file=../../etc/passwd",
                "203.0.113.10",
                Some(BROWSER_UA),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Access denied: Shield triggered");
    }

    struct FailingGate;

    #[async_trait]
    impl AdmissionService for FailingGate {
        async fn evaluate(&self, _profile: &RequestProfile<'_>) -> anyhow::Result<Decision> {
            Err(anyhow!("detector offline"))
        }
    }

    #[tokio::test]
    async fn admission_fault_fails_closed_with_500() {
        let base = AppState::fake();
        let state = AppState::from_parts(base.db.clone(), base.config.clone(), Arc::new(FailingGate));
        let app = build_app(state);

        let response = app
            .oneshot(get("/api/health", "203.0.113.11", Some(BROWSER_UA)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
    }

    struct CannedGate(Decision);

    #[async_trait]
    impl AdmissionService for CannedGate {
        async fn evaluate(&self, _profile: &RequestProfile<'_>) -> anyhow::Result<Decision> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn canned_denial_is_mapped_to_the_right_status() {
        let base = AppState::fake();
        let state = AppState::from_parts(
            base.db.clone(),
            base.config.clone(),
            Arc::new(CannedGate(Decision::Deny(DenyReason::RateLimit))),
        );
        let app = build_app(state);

        let response = app
            .oneshot(get("/api/health", "203.0.113.12", Some(BROWSER_UA)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
