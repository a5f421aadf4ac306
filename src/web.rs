use crate::scrape::{MetadataRecord, ScrapeError, Scraper};
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    scraper: Arc<Scraper>,
}

pub fn router(scraper: Arc<Scraper>) -> Router {
    let shared_state = Arc::new(SharedState { scraper });

    Router::new()
        .route("/", get(index))
        .route("/*target", get(scrape))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub async fn serve(listen: &str, scraper: Arc<Scraper>) -> anyhow::Result<()> {
    let app = router(scraper);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug)]
struct HttpError(ScrapeError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ScrapeError::InvalidUrl(_)
            | ScrapeError::LocalhostBlocked
            | ScrapeError::BlockedHost(_) => StatusCode::BAD_REQUEST,
            ScrapeError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            ScrapeError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ScrapeError::NoFavicon => StatusCode::NOT_FOUND,
            ScrapeError::Selector { .. }
            | ScrapeError::MalformedOembedLink
            | ScrapeError::OembedFetch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.0.is_client_error() || status == StatusCode::NOT_FOUND {
            log::info!("{}", self.0);
        } else {
            log::error!("{self:?}");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ScrapeError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn index(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    Json(json!({
        "instruction": format!("Go to http://{host}/{{your-url}}"),
        "linkmeta": {
            "version": env!("CARGO_PKG_VERSION"),
            "cache": state.scraper.cache_stats(),
        },
    }))
}

/// Splits off the `favicon` flag; the rest of the query belongs to the target URL.
fn split_query(query: Option<&str>) -> (bool, Option<String>) {
    let Some(query) = query else {
        return (false, None);
    };

    let mut favicon_only = false;
    let rest = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            if key == "favicon" {
                favicon_only = true;
                false
            } else {
                !pair.is_empty()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    (favicon_only, (!rest.is_empty()).then_some(rest))
}

async fn scrape(
    State(state): State<Arc<SharedState>>,
    Path(target): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, HttpError> {
    let (favicon_only, rest) = split_query(query.as_deref());
    let target = match rest {
        Some(rest) => format!("{target}?{rest}"),
        None => target,
    };

    log::info!("request: {target}");

    if favicon_only {
        let favicon = state.scraper.favicon(&target).await?;
        return Ok(Redirect::temporary(&favicon).into_response());
    }

    let record: MetadataRecord = state.scraper.scrape(&target).await?;
    log::info!("responding with metadata for {target}");

    Ok(Json(record).into_response())
}
