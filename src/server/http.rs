use std::future;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::entries::Entry;
use crate::server::auth::{require_api_key, ApiKeyGuard};
use crate::server::errors::ApiError;
use crate::store::StoreResult;
use crate::RedismanEngine;

const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    pub pattern: Option<String>,
}

pub fn router(engine: RedismanEngine, guard: ApiKeyGuard) -> Router {
    let api = Router::new()
        .route("/api/entries", get(get_entries))
        .route_layer(middleware::from_fn_with_state(guard, require_api_key));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .layer(CompressionLayer::new())
        .with_state(engine)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn start_http_server(engine: RedismanEngine, config: &Config) -> std::io::Result<()> {
    let guard = ApiKeyGuard::new(&config.auth);
    if !guard.is_enabled() {
        tracing::warn!("REDISMAN_API_KEYS is not set, /api endpoints are unprotected");
    }

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Entries API available at http://{}/api/entries", listener.local_addr()?);

    axum::serve(listener, router(engine, guard))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Streams the matching entries as one JSON array.
///
/// The first entry is awaited before answering, so an early store failure
/// still turns into a proper error status. Later failures abort the body.
#[tracing::instrument(skip_all, fields(pattern = ?query.pattern))]
async fn get_entries(
    State(engine): State<RedismanEngine>,
    query: Query<EntriesQuery>,
) -> Result<Response, ApiError> {
    let mut entries = Box::pin(engine.entries.enumerate(query.pattern.as_deref()));

    let Some(first) = entries.next().await.transpose()? else {
        return Ok(Json(Vec::<Entry>::new()).into_response());
    };

    let body = Body::from_stream(json_array(first, entries));
    Ok(([(header::CONTENT_TYPE, APPLICATION_JSON)], body).into_response())
}

fn json_array<S>(first: Entry, rest: S) -> impl Stream<Item = Result<Bytes, BoxError>> + Send + 'static
where
    S: Stream<Item = StoreResult<Entry>> + Send + 'static,
{
    let chunks = stream::once(future::ready(Ok(first)))
        .chain(rest)
        .enumerate()
        .map(|(index, item)| -> Result<Bytes, BoxError> {
            let entry = item.inspect_err(|err| {
                tracing::error!(error = %err, sent = index, "entry stream aborted");
            })?;
            let separator: &[u8] = if index == 0 { b"[" } else { b"," };
            Ok(encode(separator, &entry)?)
        });

    chunks.chain(stream::once(future::ready(Ok(Bytes::from_static(b"]")))))
}

fn encode(separator: &[u8], entry: &Entry) -> serde_json::Result<Bytes> {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(separator);
    serde_json::to_writer(&mut buf, entry)?;
    Ok(Bytes::from(buf))
}

async fn health(State(engine): State<RedismanEngine>) -> Response {
    match engine.store.ping().await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable", "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
