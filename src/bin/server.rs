//! HTTP/JSON front-end for f5-studio.
//!
//! ```text
//! f5-studio-server --worker worker/f5_worker.py --port 7860
//! ```
//!
//! Audio travels as base64-encoded WAV in both directions.  Every response
//! that ran a generation carries the notices collected along the way.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use axum::{
    extract::{DefaultBodyLimit, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use base64::Engine;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::map_response_body::MapResponseBodyLayer;
use tower_http::trace::TraceLayer;

use f5_studio::audio;
use f5_studio::chat::ChatSession;
use f5_studio::config::ModelConfig;
use f5_studio::infer::{GenerationParams, TtsRequest};
use f5_studio::model::ModelChoice;
use f5_studio::multistyle::{SpeechTypeBoard, SpeechTypeRow};
use f5_studio::normalize::NONE_CHOICE;
use f5_studio::{Feedback, Notice, Studio, StudioError, StudioSettings, Waveform};

/// Reference clips and uploads are a few seconds of 24 kHz audio.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "f5-studio-server")]
#[command(about = "Voice-cloning TTS studio over F5-TTS / E2-TTS")]
struct Cli {
    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 7860)]
    port: u16,

    /// Host to bind
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Request a public share link (not available in this server)
    #[arg(short = 's', long)]
    share: bool,

    /// Open the API to cross-origin clients (the default)
    #[arg(short = 'a', long, overrides_with = "no_api")]
    api: bool,

    /// Restrict the API to same-origin clients
    #[arg(long, overrides_with = "api")]
    no_api: bool,

    /// Serve every route under this prefix, e.g. `/tts`
    #[arg(short = 'r', long)]
    root_path: Option<String>,

    /// Open the server address in the default browser once listening
    #[arg(short = 'i', long)]
    inbrowser: bool,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inference worker script
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Interpreter for the worker script
    #[arg(long)]
    python: Option<String>,

    /// Root directory of normalizer plugins
    #[arg(long)]
    normalisers: Option<PathBuf>,

    /// OpenAI-compatible chat endpoint
    #[arg(long)]
    chat_endpoint: Option<String>,

    /// Chat model name sent to the endpoint
    #[arg(long)]
    chat_model: Option<String>,
}

impl Cli {
    fn open_api(&self) -> bool {
        !self.no_api
    }

    fn settings(&self) -> anyhow::Result<StudioSettings> {
        let mut settings = match &self.config {
            Some(path) => StudioSettings::from_file(path)?,
            None => StudioSettings::default(),
        };
        if let Some(worker) = &self.worker {
            settings.worker_script = Some(worker.clone());
        }
        if let Some(python) = &self.python {
            settings.python = Some(python.clone());
        }
        if let Some(dir) = &self.normalisers {
            settings.normalisers_dir = dir.clone();
        }
        if let Some(endpoint) = &self.chat_endpoint {
            settings.chat_endpoint = endpoint.clone();
        }
        if let Some(model) = &self.chat_model {
            settings.chat_model = model.clone();
        }
        Ok(settings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Per-client state: the chat conversation and the speech-type board.
#[derive(Default)]
struct Session {
    chat: ChatSession,
    board: SpeechTypeBoard,
}

type SharedSession = Arc<Mutex<Session>>;

#[derive(Clone)]
struct AppState {
    /// One request runs at a time.
    studio: Arc<Mutex<Studio>>,
    sessions: Arc<Mutex<HashMap<String, SharedSession>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("state lock poisoned by an earlier panic"))
}

impl AppState {
    fn session(&self, id: &str) -> anyhow::Result<SharedSession> {
        lock(&self.sessions)?
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::Error::from(StudioError::UnknownSession(id.to_string())))
    }

    /// Run `f` on the blocking pool with the studio and `id`'s session
    /// locked.
    async fn with_session<T, F>(&self, id: &str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Studio, &mut Session) -> anyhow::Result<T> + Send + 'static,
    {
        let session = self.session(id)?;
        let studio = self.studio.clone();
        blocking(move || {
            let mut studio = lock(&studio)?;
            let mut session = lock(&session)?;
            f(&mut studio, &mut session)
        })
        .await
    }

    /// Like [`with_session`](Self::with_session) for edits that never touch
    /// a model.
    async fn edit_session<T, F>(&self, id: &str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> anyhow::Result<T> + Send + 'static,
    {
        let session = self.session(id)?;
        blocking(move || f(&mut *lock(&session)?)).await
    }

    /// Run `f` on the blocking pool with the studio locked.
    async fn with_studio<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Studio) -> anyhow::Result<T> + Send + 'static,
    {
        let studio = self.studio.clone();
        blocking(move || f(&mut *lock(&studio)?)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::from(anyhow!("request task failed: {}", e)))?
        .map_err(ApiError::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration problems are the client's fault; everything else is ours.
struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    fn bad_request(error: anyhow::Error) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        let status = match error.downcast_ref::<StudioError>() {
            Some(StudioError::UnknownSession(_)) => StatusCode::NOT_FOUND,
            Some(_) => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{:#}", self.error);
        } else {
            tracing::warn!("{:#}", self.error);
        }
        let body = serde_json::json!({ "error": format!("{:#}", self.error) });
        (self.status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire helpers
// ─────────────────────────────────────────────────────────────────────────────

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Decode an uploaded base64 WAV into a kept scratch file.
fn stash_audio(encoded: &str) -> anyhow::Result<PathBuf> {
    let bytes = b64().decode(encoded.trim()).context("audio is not valid base64")?;
    audio::decode_wav_bytes(&bytes).context("audio is not a readable WAV file")?;
    let path = audio::kept_temp_file(".wav")?;
    std::fs::write(&path, &bytes).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(path)
}

/// Optional upload; malformed audio is a client error.
fn stash_optional(encoded: Option<&str>) -> Result<Option<PathBuf>, ApiError> {
    match encoded.filter(|s| !s.trim().is_empty()) {
        Some(encoded) => stash_audio(encoded).map(Some).map_err(ApiError::bad_request),
        None => Ok(None),
    }
}

fn encode_wav(wave: &Waveform) -> anyhow::Result<String> {
    Ok(b64().encode(audio::wav_bytes(wave)?))
}

fn encode_file(path: &std::path::Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(b64().encode(bytes))
}

fn default_normaliser() -> String {
    NONE_CHOICE.to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Models and normalizers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ModelsResponse {
    choices: [&'static str; 3],
    current: ModelChoice,
    /// Architecture configs offered for custom checkpoints.
    config_presets: Vec<String>,
}

async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, ApiError> {
    state
        .with_studio(|studio| {
            Ok(Json(ModelsResponse {
                choices: ModelChoice::NAMES,
                current: studio.model_choice().clone(),
                config_presets: ModelConfig::custom_presets().iter().map(ModelConfig::to_json).collect(),
            }))
        })
        .await
}

#[derive(Deserialize)]
struct SelectModel {
    name: String,
}

async fn select_model(
    State(state): State<AppState>,
    Json(req): Json<SelectModel>,
) -> Result<Json<ModelChoice>, ApiError> {
    state
        .with_studio(move |studio| Ok(Json(studio.models_mut().select(&req.name)?.clone())))
        .await
}

#[derive(Deserialize)]
struct CustomModel {
    checkpoint: String,
    #[serde(default)]
    vocab: String,
    config: String,
}

async fn set_custom_model(
    State(state): State<AppState>,
    Json(req): Json<CustomModel>,
) -> Result<Json<ModelChoice>, ApiError> {
    state
        .with_studio(move |studio| {
            studio.models_mut().set_custom(&req.checkpoint, &req.vocab, &req.config)?;
            Ok(Json(studio.model_choice().clone()))
        })
        .await
}

async fn list_normalisers(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    state.with_studio(|studio| Ok(Json(studio.normalizers().choices()))).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Basic TTS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TtsBody {
    /// Base64 WAV.
    ref_audio: Option<String>,
    #[serde(default)]
    ref_text: String,
    gen_text: String,
    #[serde(default = "default_normaliser")]
    normaliser: String,
    #[serde(default)]
    params: GenerationParams,
}

#[derive(Serialize)]
struct TtsResponse {
    audio: Option<String>,
    /// Base64 PNG.
    spectrogram: Option<String>,
    ref_text: String,
    notices: Vec<Notice>,
}

async fn basic_tts(State(state): State<AppState>, Json(req): Json<TtsBody>) -> Result<Json<TtsResponse>, ApiError> {
    let ref_audio = stash_optional(req.ref_audio.as_deref())?;
    state
        .with_studio(move |studio| {
            let mut feedback = Feedback::new();
            let request = TtsRequest {
                ref_audio: ref_audio.as_deref(),
                ref_text: &req.ref_text,
                gen_text: &req.gen_text,
                params: req.params,
            };
            let inference = studio.basic_tts(&request, &req.normaliser, &mut feedback)?;
            let (audio, spectrogram) = match &inference.output {
                Some(out) => (Some(encode_wav(&out.waveform)?), Some(encode_file(&out.spectrogram_path)?)),
                None => (None, None),
            };
            Ok(Json(TtsResponse {
                audio,
                spectrogram,
                ref_text: inference.ref_text,
                notices: feedback.into_notices(),
            }))
        })
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions and the speech-type board
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SessionView<'a> {
    id: &'a str,
    chat: &'a ChatSession,
    speech_types: Vec<(usize, &'a SpeechTypeRow)>,
}

fn session_view(id: &str, session: &Session) -> anyhow::Result<serde_json::Value> {
    let view = SessionView {
        id,
        chat: &session.chat,
        speech_types: session.board.rows().iter().enumerate().filter(|(_, r)| r.visible).collect(),
    };
    serde_json::to_value(view).context("Cannot serialise session")
}

async fn create_session(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let session = Session::default();
    let view = session_view(&id, &session)?;
    lock(&state.sessions)?.insert(id.clone(), Arc::new(Mutex::new(session)));
    tracing::info!(session = %id, "Session created");
    Ok(Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view_id = id.clone();
    state.edit_session(&id, move |session| Ok(Json(session_view(&view_id, session)?))).await
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    match lock(&state.sessions)?.remove(&id) {
        Some(_) => {
            tracing::info!(session = %id, "Session deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(anyhow::Error::from(StudioError::UnknownSession(id)).into()),
    }
}

#[derive(Serialize)]
struct AddRowResponse {
    index: Option<usize>,
    notices: Vec<Notice>,
}

async fn add_speech_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AddRowResponse>, ApiError> {
    state
        .edit_session(&id, |session| {
            let mut feedback = Feedback::new();
            let index = session.board.add(&mut feedback);
            Ok(Json(AddRowResponse { index, notices: feedback.into_notices() }))
        })
        .await
}

async fn delete_speech_type(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<StatusCode, ApiError> {
    state
        .edit_session(&id, move |session| {
            session.board.delete(index)?;
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

#[derive(Deserialize)]
struct UpdateRow {
    name: String,
    /// Base64 WAV; omitted keeps the row's current clip.
    audio: Option<String>,
    #[serde(default)]
    ref_text: String,
}

async fn update_speech_type(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Json(req): Json<UpdateRow>,
) -> Result<Json<SpeechTypeRow>, ApiError> {
    let upload = stash_optional(req.audio.as_deref())?;
    state
        .edit_session(&id, move |session| {
            let audio = upload.or_else(|| session.board.row(index).and_then(|r| r.audio.clone()));
            session.board.update(index, &req.name, audio, &req.ref_text)?;
            let row = session.board.row(index).cloned().unwrap_or_default();
            Ok(Json(row))
        })
        .await
}

#[derive(Deserialize)]
struct InsertLabel {
    #[serde(default)]
    script: String,
}

async fn insert_speech_type_label(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Json(req): Json<InsertLabel>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .edit_session(&id, move |session| {
            let script = session.board.insert_label(index, &req.script)?;
            Ok(Json(serde_json::json!({
                "script": script,
                "can_generate": session.board.can_generate(&script),
            })))
        })
        .await
}

#[derive(Deserialize)]
struct MultistyleBody {
    script: String,
    #[serde(default)]
    remove_silence: bool,
    #[serde(default = "default_normaliser")]
    normaliser: String,
}

#[derive(Serialize)]
struct AudioResponse {
    audio: Option<String>,
    notices: Vec<Notice>,
}

async fn multistyle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MultistyleBody>,
) -> Result<Json<AudioResponse>, ApiError> {
    state
        .with_session(&id, move |studio, session| {
            let mut feedback = Feedback::new();
            let wave = studio.multistyle(
                &mut session.board,
                &req.script,
                req.remove_silence,
                &req.normaliser,
                &mut feedback,
            )?;
            Ok(Json(AudioResponse {
                audio: wave.as_ref().map(encode_wav).transpose()?,
                notices: feedback.into_notices(),
            }))
        })
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice chat
// ─────────────────────────────────────────────────────────────────────────────

async fn load_chat_model(State(state): State<AppState>) -> Result<Json<Vec<Notice>>, ApiError> {
    state
        .with_studio(|studio| {
            let mut feedback = Feedback::new();
            studio.load_chat_model(&mut feedback)?;
            Ok(Json(feedback.into_notices()))
        })
        .await
}

#[derive(Deserialize)]
struct ChatVoice {
    /// Base64 WAV; omitted keeps the current voice.
    audio: Option<String>,
    #[serde(default)]
    ref_text: String,
    #[serde(default)]
    remove_silence: bool,
}

async fn set_chat_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatVoice>,
) -> Result<StatusCode, ApiError> {
    let upload = stash_optional(req.audio.as_deref())?;
    state
        .edit_session(&id, move |session| {
            if upload.is_some() {
                session.chat.ref_audio = upload;
            }
            session.chat.ref_text = req.ref_text;
            session.chat.remove_silence = req.remove_silence;
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

#[derive(Deserialize)]
struct ChatTurn {
    #[serde(default)]
    text: String,
    /// Base64 WAV, transcribed when `text` is blank.
    audio: Option<String>,
}

async fn chat_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatTurn>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = stash_optional(req.audio.as_deref())?;
    state
        .with_session(&id, move |studio, session| {
            let reply = studio.chat_turn(&mut session.chat, upload.as_deref(), &req.text)?;
            Ok(Json(serde_json::json!({
                "reply": reply,
                "history": session.chat.conversation.history(),
            })))
        })
        .await
}

#[derive(Serialize)]
struct SpokenResponse {
    audio: Option<String>,
    ref_text: String,
    notices: Vec<Notice>,
}

async fn speak_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SpokenResponse>, ApiError> {
    state
        .with_session(&id, |studio, session| {
            let mut feedback = Feedback::new();
            let spoken = studio.speak_reply(&mut session.chat, &mut feedback)?;
            Ok(Json(SpokenResponse {
                audio: spoken.as_ref().map(|s| encode_wav(&s.waveform)).transpose()?,
                ref_text: session.chat.ref_text.clone(),
                notices: feedback.into_notices(),
            }))
        })
        .await
}

async fn clear_chat(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .edit_session(&id, |session| {
            session.chat.clear();
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

#[derive(Deserialize)]
struct SystemPrompt {
    prompt: String,
}

async fn set_system_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SystemPrompt>,
) -> Result<StatusCode, ApiError> {
    state
        .edit_session(&id, move |session| {
            session.chat.set_system_prompt(&req.prompt);
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model = state.studio.try_lock().ok().map(|s| s.model_choice().name());
    Json(serde_json::json!({ "status": "ok", "busy": model.is_none(), "model": model }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

fn create_router(state: AppState, open_api: bool) -> Router {
    let cors = if open_api {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/models/select", post(select_model))
        .route("/api/models/custom", post(set_custom_model))
        .route("/api/normalisers", get(list_normalisers))
        .route("/api/tts", post(basic_tts))
        .route("/api/chat/load", post(load_chat_model))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/speech_types", post(add_speech_type))
        .route(
            "/api/sessions/{id}/speech_types/{index}",
            put(update_speech_type).delete(delete_speech_type),
        )
        .route("/api/sessions/{id}/speech_types/{index}/insert", post(insert_speech_type_label))
        .route("/api/sessions/{id}/multistyle", post(multistyle))
        .route("/api/sessions/{id}/chat", post(chat_turn).delete(clear_chat))
        .route("/api/sessions/{id}/chat/voice", put(set_chat_voice))
        .route("/api/sessions/{id}/chat/speak", post(speak_reply))
        .route("/api/sessions/{id}/chat/system_prompt", put(set_system_prompt))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::disable())
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    tracing::info!("Starting f5-studio v{}", env!("CARGO_PKG_VERSION"));
    if cli.share {
        tracing::warn!("--share is not supported; serving on {} only", cli.host);
    }

    let settings = cli.settings()?;
    tracing::info!("Starting app...");
    let studio = tokio::task::spawn_blocking(move || Studio::with_worker(settings))
        .await
        .context("startup task failed")??;
    let state = AppState {
        studio: Arc::new(Mutex::new(studio)),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let router = create_router(state, cli.open_api());
    let prefix = route_prefix(cli.root_path.as_deref());
    let app = if prefix.is_empty() { router } else { Router::new().nest(&prefix, router) };

    let listener = bind(&cli.host, cli.port).await?;
    let addr = listener.local_addr().context("Listener has no local address")?;
    tracing::info!("Listening on http://{}{}", addr, prefix);

    if cli.inbrowser {
        open_browser(&format!("http://{}{}/health", addr, prefix));
    }

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Bind `host:port`; `host` may be a name such as `localhost`.
async fn bind(host: &str, port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Cannot bind {}:{}", host, port))
}

/// `--root-path` as a nest prefix: leading slash, no trailing slash, empty
/// for the root.
fn route_prefix(root_path: Option<&str>) -> String {
    match root_path.map(|p| p.trim().trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("/{}", p),
        _ => String::new(),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "f5_studio=info,f5_studio_server=info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_browser(url: &str) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(opener).arg(url).spawn() {
        tracing::warn!("Cannot open browser with {}: {}", opener, e);
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_studio_errors_are_client_errors() {
        let err: ApiError = anyhow::Error::from(StudioError::UnknownChoice("X".into())).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: ApiError = anyhow::Error::from(StudioError::UnknownSession("abc".into())).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err: ApiError = anyhow!("worker crashed").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_context_keeps_studio_error() {
        let err = anyhow::Error::from(StudioError::EmptyCheckpoint).context("While selecting");
        let err: ApiError = err.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::parse_from([
            "f5-studio-server",
            "-p",
            "9000",
            "--worker",
            "w.py",
            "--chat-model",
            "tiny",
        ]);
        assert_eq!(cli.port, 9000);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.worker_script, Some(PathBuf::from("w.py")));
        assert_eq!(settings.chat_model, "tiny");
        assert_eq!(settings.normalisers_dir, PathBuf::from("normalisers"));
    }

    #[test]
    fn test_api_open_by_default() {
        assert!(Cli::parse_from(["f5-studio-server"]).open_api());
        assert!(Cli::parse_from(["f5-studio-server", "-a"]).open_api());
        assert!(!Cli::parse_from(["f5-studio-server", "--no-api"]).open_api());
        assert!(Cli::parse_from(["f5-studio-server", "--no-api", "--api"]).open_api());
    }

    #[test]
    fn test_route_prefix() {
        assert_eq!(route_prefix(None), "");
        assert_eq!(route_prefix(Some("/")), "");
        assert_eq!(route_prefix(Some("tts/")), "/tts");
        assert_eq!(route_prefix(Some("/a/b")), "/a/b");
    }

    #[tokio::test]
    async fn test_bind_accepts_host_names() {
        let listener = bind("localhost", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_stash_audio_rejects_garbage() {
        assert!(stash_audio("not base64 !!").is_err());
        assert!(stash_audio(&b64().encode(b"RIFFjunk")).is_err());
    }

    #[test]
    fn test_stash_audio_writes_wav() {
        let wave = Waveform::new(vec![0.0, 0.25, -0.25], 24_000);
        let path = stash_audio(&encode_wav(&wave).unwrap()).unwrap();
        assert_eq!(audio::read_wav(&path).unwrap().samples.len(), 3);
        std::fs::remove_file(path).unwrap();
    }
}
