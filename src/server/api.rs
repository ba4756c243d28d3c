use crate::cli::Args;
use crate::models::chat::RelayRequest;
use crate::relay::{ EventStream, Relay };
use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{ rejection::BytesRejection, DefaultBodyLimit, State },
    http::{ header, HeaderValue, Method },
    response::{ sse::{ Event, Sse }, IntoResponse, Response },
    routing::post,
    Router,
};
use futures::StreamExt;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

pub const CHAT_ROUTE: &str = "/api/chat";

#[derive(Clone)]
struct AppState {
    relay: Arc<Relay>,
}

/// The CORS layer answers every `OPTIONS` request itself (200, empty body).
pub fn router(relay: Arc<Relay>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(CHAT_ROUTE, post(chat_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .with_state(AppState { relay })
}

pub async fn start_http_server(
    addr: SocketAddr,
    relay: Arc<Relay>,
    args: &Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = router(relay, args.max_body_bytes);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                error!("--enable-tls was set but --tls-cert-path and --tls-key-path are not both provided.");
                return Err("TLS enabled without cert/key".into());
            }
        };
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Chat relay listening on https://{}{}", addr, CHAT_ROUTE);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Chat relay listening on http://{}{}", addr, CHAT_ROUTE);
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

/// Always answers with an event stream. Unreadable or oversized bodies
/// produce a single in-band error so clients have one code path.
async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let events = match body {
        Ok(bytes) => match RelayRequest::from_slice(&bytes) {
            Ok(request) => state.relay.relay(request),
            Err(reason) => state.relay.reject(&reason),
        },
        Err(rejection) => state.relay.reject(&rejection.body_text()),
    };
    sse_response(events)
}

fn sse_response(events: EventStream) -> Response {
    let frames = events.map(|event| Ok::<Event, Infallible>(Event::default().data(event.to_data())));
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))],
        Sse::new(frames),
    ).into_response()
}
