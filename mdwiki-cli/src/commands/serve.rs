//! Serve command implementation: HTTP routes over the live content index.

use anyhow::{Context, Result};
use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mdwiki_core::{canonicalize, Config, ContentIndex, IndexWatcher, RenderError, Renderer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// The server only terminates plain TCP
const SCHEME: &str = "http";

/// Serve options from the command line; they override the config file.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub path: PathBuf,
    pub include: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub watch: bool,
}

#[derive(Clone)]
struct AppState {
    index: Arc<ContentIndex>,
    renderer: Renderer,
    listen_addr: Arc<str>,
}

impl AppState {
    fn new(index: Arc<ContentIndex>, listen_addr: impl Into<Arc<str>>) -> Self {
        Self {
            renderer: Renderer::new(index.clone()),
            index,
            listen_addr: listen_addr.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NotFound {
    error: &'static str,
    request: RequestInfo,
    url: String,
}

#[derive(Debug, Serialize)]
struct RequestInfo {
    args: String,
    page: String,
}

#[derive(Debug, Serialize)]
struct ServerError {
    error: &'static str,
    file: String,
}

/// Start the wiki server and block until Ctrl-C
pub async fn serve_wiki(config_path: Option<&Path>, opts: ServeOptions) -> Result<()> {
    let config = load_config(config_path, opts)?;
    let roots = config
        .include_roots()
        .context("Invalid include directories")?;
    let excludes = config.exclude_rules().context("Invalid exclude rules")?;
    let index = Arc::new(ContentIndex::with_excludes(excludes));

    let watcher = if config.watch {
        let watcher = IndexWatcher::start(index.clone(), roots)
            .await
            .context("Failed to start file watcher")?;
        Some(watcher)
    } else {
        for root in roots {
            let index = index.clone();
            let summary = tokio::task::spawn_blocking(move || index.scan(&root))
                .await
                .context("Scan task failed")?
                .context("Failed to scan include directory")?;
            tracing::debug!("Initial scan: {} documents added", summary.added);
        }
        None
    };

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    tracing::info!(
        "Serving {} documents on {}://{}",
        index.len(),
        SCHEME,
        local_addr
    );
    println!("\nServing at {}://{}", SCHEME, local_addr);
    println!("   Press Ctrl+C to stop\n");

    let app = router(AppState::new(index, local_addr.to_string()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(watcher) = watcher {
        watcher.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Merge the optional config file with command-line options
fn load_config(config_path: Option<&Path>, opts: ServeOptions) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::default(),
    };

    // Command-line paths are relative to the working directory, not the
    // config file
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    if !opts.include.is_empty() {
        config.include = opts.include.iter().map(|p| cwd.join(p)).collect();
    } else if config.include.is_empty() {
        config.include = vec![cwd.join(&opts.path)];
    }

    config.exclude.extend(opts.exclude);
    if let Some(hostname) = opts.hostname {
        config.server.hostname = hostname;
    }
    if let Some(port) = opts.port {
        config.server.port = port;
    }
    config.watch |= opts.watch;

    Ok(config)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_page))
        .route("/{page_name}", get(page))
        .route("/{page_name}/{*rest}", get(page_with_rest))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn home_page(State(state): State<AppState>) -> Response {
    resolve(state, "home".to_string(), String::new()).await
}

async fn page(State(state): State<AppState>, AxumPath(page_name): AxumPath<String>) -> Response {
    resolve(state, page_name, String::new()).await
}

async fn page_with_rest(
    State(state): State<AppState>,
    AxumPath((page_name, rest)): AxumPath<(String, String)>,
) -> Response {
    let rest = rest.trim_start_matches('/').to_string();
    resolve(state, page_name, rest).await
}

/// Paths the routes do not cover, such as `/page/` with an empty rest
async fn fallback(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let (page_name, rest) = path.split_once('/').unwrap_or((path, ""));
    let page_name = if page_name.is_empty() {
        "home"
    } else {
        page_name
    };
    resolve(state, page_name.to_string(), rest.to_string()).await
}

/// Look up `page` as a slug and render it, or answer with a 404 payload
async fn resolve(state: AppState, page: String, args: String) -> Response {
    let Some(record) = state.index.lookup(&page) else {
        return not_found(&state, page, args);
    };

    let renderer = state.renderer.clone();
    let file = record.path.clone();
    match tokio::task::spawn_blocking(move || renderer.render(&record)).await {
        Ok(Ok(html)) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            html,
        )
            .into_response(),
        Ok(Err(err)) => render_failure(err),
        Err(err) => {
            tracing::error!("Render task failed for {:?}: {}", file, err);
            server_error("failed to render markdown", &file)
        }
    }
}

fn not_found(state: &AppState, page: String, args: String) -> Response {
    let url = format!("{}://{}/{}", SCHEME, state.listen_addr, canonicalize(&page));
    tracing::debug!("No document for {:?}", page);

    let payload = NotFound {
        error: "page not found",
        request: RequestInfo { args, page },
        url,
    };
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn render_failure(err: RenderError) -> Response {
    tracing::warn!("{}", err);
    let error = match &err {
        RenderError::Read { .. } => "failed to open file",
        RenderError::Frontmatter { .. } => "failed to parse frontmatter",
        RenderError::Convert { .. } => "failed to render markdown",
    };
    server_error(error, err.path())
}

fn server_error(error: &'static str, file: &Path) -> Response {
    let payload = ServerError {
        error,
        file: file.display().to_string(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
