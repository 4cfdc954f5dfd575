use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::{Octoshop, Presenter};
use crate::poll::{Progress, ProgressSink};
use crate::render::{Column, RenderedResult, ResultSink};

const INDEX_TEMPLATE: &str = include_str!("index.html");

#[derive(Clone)]
pub struct AppState {
    octoshop: Octoshop,
    config: Arc<Config>,
    page: Arc<String>,
}

impl AppState {
    pub fn new(octoshop: Octoshop, config: Config) -> Self {
        let page = render_page(&config);
        Self {
            octoshop,
            config: Arc::new(config),
            page: Arc::new(page),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/octoshop", post(octoshop_upload))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn render_page(config: &Config) -> String {
    let prompt_field = if config.custom_prompt {
        format!(
            r#"<input type="text" id="promptInput" class="prompt-input" value="{}" placeholder="Transformation prompt">"#,
            escape_html(&config.default_prompt)
        )
    } else {
        String::new()
    };
    INDEX_TEMPLATE.replace("{{PROMPT_FIELD}}", &prompt_field)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.page.as_ref().clone())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct DonePayload {
    elapsed_secs: f64,
}

#[derive(Serialize)]
struct ResultPayload {
    index: usize,
    column: Column,
    image: String,
    caption: String,
    description: Option<String>,
}

#[derive(Serialize)]
struct ErrorPayload {
    message: &'static str,
}

/// Forwards one run's output to the browser as server-sent events.
struct SsePresenter {
    tx: mpsc::UnboundedSender<Event>,
}

impl SsePresenter {
    fn emit<T: Serialize>(&self, name: &str, payload: &T) {
        match Event::default().event(name).json_data(payload) {
            // A closed channel means the browser went away; the jobs still run to completion.
            Ok(event) => {
                let _ = self.tx.send(event);
            }
            Err(e) => warn!(event = name, error = %e, "failed to serialize event"),
        }
    }
}

impl ProgressSink for SsePresenter {
    fn progress(&self, progress: Progress) {
        self.emit("progress", &progress);
    }
}

impl ResultSink for SsePresenter {
    fn show(&self, result: RenderedResult) {
        self.emit(
            "result",
            &ResultPayload {
                index: result.index,
                column: result.column,
                image: result.data_url,
                caption: result.caption,
                description: result.description,
            },
        );
    }
}

impl Presenter for SsePresenter {
    fn completed(&self, elapsed: Duration) {
        self.emit(
            "done",
            &DonePayload {
                elapsed_secs: elapsed.as_secs_f64(),
            },
        );
    }

    fn failed(&self, message: &'static str) {
        self.emit("error", &ErrorPayload { message });
    }
}

async fn octoshop_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let bad_request = |msg: String| (StatusCode::BAD_REQUEST, msg);

    let mut upload = None;
    let mut requested_prompt = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let data = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
                upload = Some(data.to_vec());
            }
            Some("prompt") => {
                requested_prompt = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            _ => {}
        }
    }

    let upload = upload
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| bad_request("missing image upload".to_string()))?;
    let prompt = state.config.resolve_prompt(requested_prompt.as_deref());
    info!(bytes = upload.len(), %prompt, "octoshop request");

    let (tx, rx) = mpsc::unbounded_channel();
    let octoshop = state.octoshop.clone();
    tokio::spawn(async move {
        let presenter = SsePresenter { tx };
        // Failures were already reported to the browser.
        let _ = octoshop.run(upload, &prompt, &presenter).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
