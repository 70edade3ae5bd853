//! Rate limiting at the HTTP boundary, exercised through the full router.

#![allow(clippy::panic)]

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use tower::ServiceExt;

use relay_gateway::config::GatewayConfig;
use relay_gateway::domain::Role;
use relay_gateway::router::build_app;

use common::{json_body, request, test_config, test_state};

fn app(config: &GatewayConfig) -> Router {
    let (state, _store) = test_state(config);
    build_app(state)
}

fn limited_config() -> GatewayConfig {
    GatewayConfig {
        rate_limit_anonymous: 3,
        rate_limit_authenticated: 5,
        ..test_config()
    }
}

fn from_ip(mut req: Request<Body>, ip: &'static str) -> Request<Body> {
    req.headers_mut()
        .insert("x-forwarded-for", axum::http::HeaderValue::from_static(ip));
    req
}

async fn status(app: &Router, req: Request<Body>) -> StatusCode {
    let Ok(response) = app.clone().oneshot(req).await else {
        panic!("router failed");
    };
    response.status()
}

#[tokio::test]
async fn anonymous_caller_is_rejected_after_budget() {
    let app = app(&limited_config());
    let webhooks = "/api/v1/admin/webhooks";

    for _ in 0..3 {
        let req = from_ip(request(Method::GET, webhooks, None, None), "10.0.0.1");
        assert_eq!(status(&app, req).await, StatusCode::UNAUTHORIZED);
    }

    let req = from_ip(request(Method::GET, webhooks, None, None), "10.0.0.1");
    let Ok(response) = app.clone().oneshot(req).await else {
        panic!("router failed");
    };
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    assert!(retry_after.is_some_and(|secs| (1..=60).contains(&secs)));

    let body = json_body(response).await;
    let error = body.get("error");
    assert_eq!(error.and_then(|e| e.get("code")).and_then(|c| c.as_u64()), Some(429));
    assert_eq!(
        error
            .and_then(|e| e.get("details"))
            .and_then(|d| d.get("limit"))
            .and_then(|l| l.as_u64()),
        Some(3)
    );
}

#[tokio::test]
async fn anonymous_addresses_have_separate_budgets() {
    let app = app(&limited_config());
    for _ in 0..3 {
        let req = from_ip(request(Method::GET, "/api/v1/admin/webhooks", None, None), "10.0.0.2");
        status(&app, req).await;
    }
    let req = from_ip(request(Method::GET, "/api/v1/admin/webhooks", None, None), "10.0.0.3");
    assert_eq!(status(&app, req).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identities_have_independent_budgets() {
    let app = app(&limited_config());
    let uri = "/api/v1/admin/webhooks";

    for _ in 0..5 {
        let req = request(Method::GET, uri, Some(("student-a", Role::Student)), None);
        assert_eq!(status(&app, req).await, StatusCode::FORBIDDEN);
    }
    let req = request(Method::GET, uri, Some(("student-a", Role::Student)), None);
    assert_eq!(status(&app, req).await, StatusCode::TOO_MANY_REQUESTS);

    let req = request(Method::GET, uri, Some(("student-b", Role::Student)), None);
    assert_eq!(status(&app, req).await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn administrators_bypass_the_limiter() {
    let app = app(&limited_config());
    for _ in 0..20 {
        let req = request(
            Method::GET,
            "/api/v1/admin/webhooks",
            Some(("root", Role::Admin)),
            None,
        );
        assert_eq!(status(&app, req).await, StatusCode::OK);
    }
}

#[tokio::test]
async fn admin_bypass_can_be_disabled() {
    let config = GatewayConfig {
        rate_limit_admin_bypass: false,
        ..limited_config()
    };
    let app = app(&config);
    let uri = "/api/v1/admin/ws/online";

    for _ in 0..5 {
        let req = request(Method::GET, uri, Some(("root", Role::Admin)), None);
        assert_eq!(status(&app, req).await, StatusCode::OK);
    }
    let req = request(Method::GET, uri, Some(("root", Role::Admin)), None);
    assert_eq!(status(&app, req).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_never_limited() {
    let app = app(&limited_config());
    for _ in 0..10 {
        let req = from_ip(request(Method::GET, "/health", None, None), "10.0.0.9");
        assert_eq!(status(&app, req).await, StatusCode::OK);
    }
}
