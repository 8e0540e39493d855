use axum::{
    Form, Json, Router,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

use tracing::{debug, info};

use crate::client::RagbotClient;
use crate::config::AppConfig;
use crate::render::{render_conversation, render_page};
use crate::session::WidgetStore;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// One chat widget per browser session.
    pub widgets: WidgetStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskForm {
    session_id: Option<String>,
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct ClearForm {
    session_id: Option<String>,
}

/// Build the router for the chat page and its HTMX endpoints.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { Redirect::to("/chat/") }))
        .route("/chat/", get(chat_page))
        .route("/chat/ask", post(ask))
        .route("/chat/clear", post(clear))
        .route("/health", get(health));

    if let Some(secs) = state.config.server.request_timeout_secs {
        let duration = Duration::from_secs(secs);
        app = app.layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn chat_page(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Html<String> {
    let (id, widget) = state.widgets.get_or_create(query.session_id.as_deref());
    Html(render_page(&widget.snapshot(), &id.to_string()))
}

async fn ask(State(state): State<AppState>, Form(form): Form<AskForm>) -> Html<String> {
    let (id, widget) = state.widgets.get_or_create(form.session_id.as_deref());
    let outcome = widget.ask(form.q).await;
    debug!(
        name: "chat.ask.completed",
        session_id = %id,
        outcome = ?outcome,
        "Ask handled"
    );
    Html(render_conversation(&widget.snapshot()))
}

async fn clear(State(state): State<AppState>, Form(form): Form<ClearForm>) -> Html<String> {
    let (_, widget) = state.widgets.get_or_create(form.session_id.as_deref());
    widget.clear();
    Html(render_conversation(&widget.snapshot()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let client = RagbotClient::from_config(&config.backend)?;

    info!(
        name: "backend.config.loaded",
        base_url = %client.base_url(),
        timeout_secs = ?config.backend.timeout_secs,
        "Answer service configured"
    );

    let widgets = WidgetStore::new(Arc::new(client));

    let idle = Duration::from_secs(config.server.session_idle_secs);
    tokio::spawn({
        let widgets = widgets.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let removed = widgets.cleanup_idle(idle);
                if removed > 0 {
                    debug!(name: "session.expired", removed, "Idle sessions removed");
                }
            }
        }
    });

    let state = AppState {
        widgets,
        config: Arc::clone(&config),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
