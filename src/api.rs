use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::{
    config::Settings,
    error::Error,
    model::CommentId,
    service::{CommentService, CreateComment, PageRequest, ReplyRequest},
    utils::{now_ts, parse_or},
};

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub service: CommentService,
}

pub fn router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.settings.cors_allow_origin)?;
    Ok(Router::new()
        .route("/health", get(health))
        .route("/comments", get(list_comments).post(create_comment))
        .route("/comments/{id}/replies", get(list_replies))
        .route("/comments/{id}/like", post(like_comment))
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origin: &str) -> Result<CorsLayer> {
    if origin == "*" {
        return Ok(CorsLayer::permissive());
    }
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("CORS_ALLOW_ORIGIN is not a valid header value: {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

pub async fn serve(settings: Settings, service: CommentService) -> Result<()> {
    let addr = settings.bind_addr();
    let app = router(AppState {
        settings: settings.clone(),
        service,
    })?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    log::info!("server.start url=http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("server.stop");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("server.signal_error {e}");
    }
}

async fn health(State(st): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "ts": now_ts(),
        "store": st.service.store_kind(),
        "maxPageLimit": st.service.max_limit(),
    }))
}

// Query values stay strings so junk falls back to defaults instead of a 400.
#[derive(Debug, Default, Deserialize)]
struct PageQ {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepliesQ {
    page: Option<String>,
    skip: Option<String>,
    limit: Option<String>,
}

impl From<PageQ> for PageRequest {
    fn from(q: PageQ) -> Self {
        let d = PageRequest::default();
        PageRequest {
            page: parse_or(q.page.as_deref(), d.page, 1),
            limit: parse_or(q.limit.as_deref(), d.limit, 1),
        }
    }
}

impl From<RepliesQ> for ReplyRequest {
    fn from(q: RepliesQ) -> Self {
        let d = ReplyRequest::default();
        ReplyRequest {
            page: parse_or(q.page.as_deref(), d.page, 1),
            skip: parse_or(q.skip.as_deref(), d.skip, 0),
            limit: parse_or(q.limit.as_deref(), d.limit, 1),
        }
    }
}

/// Ids that are not integers cannot name a comment.
fn parse_id(raw: &str) -> Result<CommentId, Error> {
    raw.trim()
        .parse::<CommentId>()
        .map_err(|_| Error::not_found("Comment not found"))
}

async fn list_comments(
    State(st): State<AppState>,
    Query(q): Query<PageQ>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(st.service.list_root_comments(q.into())?))
}

async fn list_replies(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<RepliesQ>,
) -> Result<impl IntoResponse, Error> {
    let id = parse_id(&id)?;
    Ok(Json(st.service.list_replies(id, q.into())?))
}

async fn create_comment(
    State(st): State<AppState>,
    body: Result<Json<CreateComment>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let Json(input) = body
        .map_err(|e| Error::validation(format!("Invalid request body: {}", e.body_text())))?;
    let comment = st.service.create_comment(input)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn like_comment(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let id = parse_id(&id)?;
    let likes = st.service.like_comment(id)?;
    Ok(Json(serde_json::json!({ "likes": likes })))
}
