//! The gateway: broker routes, edge route guard and maintenance gate.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;

use crate::{
    config::{Environment, RuntimeMode},
    credentials::{CLEAR_TOKENS_ROUTE, REFRESH_ROUTE, SET_TOKENS_ROUTE},
};

pub mod backend;
pub mod guard;
pub mod handlers;
pub mod maintenance;
mod openapi;

pub use backend::{BackendClient, BackendConfig, BackendError};
pub use guard::{sanitize_callback, RouteConfig, RouteRules};
pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    pub routes: RouteConfig,
    pub environment: Environment,
    pub mode: RuntimeMode,
}

/// Build the gateway router.
///
/// # Errors
/// Returns an error if the backend client or the route rules cannot be built.
pub fn app(config: &GatewayConfig) -> Result<Router> {
    let backend = BackendClient::new(&config.backend)?;
    let rules = Arc::new(RouteRules::new(&config.routes).context("Invalid route configuration")?);
    let secure_cookies = config.environment.secure_cookies();
    let broker = Arc::new(handlers::BrokerState::new(backend, secure_cookies));

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route(SET_TOKENS_ROUTE, post(handlers::set_tokens))
        .route(REFRESH_ROUTE, post(handlers::refresh))
        .route(CLEAR_TOKENS_ROUTE, post(handlers::clear_tokens))
        .fallback(handlers::page_shell);

    let router = match &config.mode {
        RuntimeMode::Normal => {
            router.layer(middleware::from_fn_with_state(rules, guard::route_guard))
        }
        RuntimeMode::Maintenance(secret) => {
            let gate = Arc::new(maintenance::MaintenanceGate::new(
                secret.clone(),
                secure_cookies,
            ));
            router
                .layer(middleware::from_fn_with_state(rules, guard::route_guard))
                .layer(middleware::from_fn_with_state(
                    gate,
                    maintenance::maintenance_gate,
                ))
        }
        RuntimeMode::DevBypass => {
            warn!("DEV AUTH BYPASS ACTIVE: edge route guard disabled");
            router
        }
    };

    Ok(router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID_HEADER),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(broker))
            .layer(Extension(config.mode.clone())),
    ))
}

/// Start the gateway and serve until interrupted.
///
/// # Errors
/// Returns an error if the router cannot be built or the port cannot be bound.
pub async fn new(port: u16, config: GatewayConfig) -> Result<()> {
    let app = app(&config)?;

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!(
        "Listening on [::]:{} (environment: {}, mode: {})",
        port,
        config.environment,
        config.mode.name()
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{
        header::{COOKIE, LOCATION},
        StatusCode,
    };
    use secrecy::SecretString;
    use tower::ServiceExt;
    use url::Url;

    fn config(mode: RuntimeMode) -> GatewayConfig {
        GatewayConfig {
            backend: BackendConfig::new(Url::parse("http://127.0.0.1:9").unwrap()),
            routes: RouteConfig::default(),
            environment: Environment::Development,
            mode,
        }
    }

    async fn get(app: Router, uri: &str, cookie: Option<&'static str>) -> axum::response::Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn guard_redirects_protected_pages() {
        let app = app(&config(RuntimeMode::Normal)).unwrap();

        let response = get(app.clone(), "/dashboard", None).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/login?callbackUrl=%2Fdashboard"
        );

        let response = get(app, "/dashboard", Some("access_token=a1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let app = app(&config(RuntimeMode::Normal)).unwrap();

        let response = get(app.clone(), "/health", None).await;
        let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(Ulid::from_string(id.to_str().unwrap()).is_ok());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-42");
    }

    #[tokio::test]
    async fn dev_bypass_disables_guard() {
        let app = app(&config(RuntimeMode::DevBypass)).unwrap();
        let response = get(app, "/dashboard", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn maintenance_preempts_guard_but_not_broker() {
        let mode = RuntimeMode::Maintenance(SecretString::from("s3cret".to_string()));
        let app = app(&config(mode)).unwrap();

        let page = get(app.clone(), "/dashboard", None).await;
        assert_eq!(page.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bypassed = get(app.clone(), "/dashboard", Some("maintenance_bypass=1")).await;
        assert_eq!(bypassed.status(), StatusCode::TEMPORARY_REDIRECT);

        let health = get(app, "/health", None).await;
        assert_eq!(health.status(), StatusCode::OK);
    }
}
