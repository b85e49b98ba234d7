//! Development server implementation.

use std::future::Future;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::services::{ServeDir, ServeFile};

use crate::livereload::{
    inject_reload_script, ReloadHub, ReloadMessage, CLIENT_SCRIPT, SCRIPT_PATH, SOCKET_PATH,
};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Document served for paths that match no file, relative to `root`
    pub fallback: String,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,

    /// Serve the live reload socket and inject its script into pages
    pub livereload: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            fallback: "index.html".to_string(),
            host: "localhost".to_string(),
            port: 3000,
            open: true,
            livereload: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared server state.
#[derive(Clone)]
struct ServerState {
    hub: ReloadHub,
    closing: watch::Receiver<bool>,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a server pushing reloads from `hub`.
    pub fn new(config: DevServerConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    /// URL the server is reachable at.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.port)
    }

    /// Bind, optionally open the browser, and serve until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let url = self.url();
        tracing::info!("Serving {} at {}", self.config.root.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down server");
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (close_tx, close_rx) = watch::channel(false);
        let app = self.router(close_rx);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // Live reload sockets never end on their own.
                let _ = close_tx.send(true);
            })
            .await?;

        Ok(())
    }

    fn router(&self, closing: watch::Receiver<bool>) -> Router {
        let root = &self.config.root;
        let files = ServeDir::new(root).fallback(ServeFile::new(root.join(&self.config.fallback)));

        if !self.config.livereload {
            return Router::new().fallback_service(files);
        }

        let state = ServerState {
            hub: self.hub.clone(),
            closing,
        };

        Router::new()
            .route(SOCKET_PATH, get(ws_handler))
            .route(SCRIPT_PATH, get(script_handler))
            .fallback_service(files)
            .layer(middleware::map_response(inject_into_html))
            .with_state(state)
    }
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forward reload messages to one browser until it or the server goes away.
async fn handle_ws(mut socket: WebSocket, state: ServerState) {
    let ServerState { hub, mut closing } = state;
    let mut rx = hub.subscribe();

    if send(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(msg) => {
                    if send(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = closing.changed() => break,
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the live reload client script.
async fn script_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_SCRIPT)
}

/// Add the live reload script to successful HTML responses.
async fn inject_into_html(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_reload_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw).into_owned();
        let status = text[9..12].parse().unwrap();
        (status, text)
    }

    async fn spawn(config: DevServerConfig) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = DevServer::new(config, ReloadHub::new());
        tokio::spawn(server.serve(listener, async {
            let _ = stop_rx.await;
        }));

        (addr, stop_tx)
    }

    fn site() -> (tempfile::TempDir, DevServerConfig) {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><div id=\"app\"></div></body></html>",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("js")).unwrap();
        fs::write(temp.path().join("js/main.js"), "console.log('hi');").unwrap();

        let config = DevServerConfig {
            root: temp.path().to_path_buf(),
            open: false,
            ..DevServerConfig::default()
        };
        (temp, config)
    }

    #[test]
    fn default_config() {
        let config = DevServerConfig::default();

        assert_eq!(config.fallback, "index.html");
        assert_eq!(config.port, 3000);
        assert!(config.livereload);
    }

    #[tokio::test]
    async fn serves_files_and_falls_back_to_index() {
        let (_temp, config) = site();
        let (addr, _stop) = spawn(config).await;

        let (status, body) = get(addr, "/js/main.js").await;
        assert_eq!(status, 200);
        assert!(body.ends_with("console.log('hi');"));

        let (status, body) = get(addr, "/some/client/route").await;
        assert_eq!(status, 200);
        assert!(body.contains("<div id=\"app\"></div>"));
    }

    #[tokio::test]
    async fn injects_reload_script_into_pages() {
        let (_temp, config) = site();
        let (addr, _stop) = spawn(config).await;

        let (_, page) = get(addr, "/").await;
        assert!(page.contains("<script src=\"/__livereload.js\"></script></body>"));

        let (_, script) = get(addr, "/js/main.js").await;
        assert!(!script.contains("__livereload"));

        let (status, client) = get(addr, "/__livereload.js").await;
        assert_eq!(status, 200);
        assert!(client.contains("application/javascript"));
        assert!(client.contains("new WebSocket"));
    }

    #[tokio::test]
    async fn without_livereload_pages_are_untouched() {
        let (_temp, config) = site();
        let (addr, _stop) = spawn(DevServerConfig {
            livereload: false,
            ..config
        })
        .await;

        let (_, page) = get(addr, "/").await;
        assert!(!page.contains("__livereload"));

        let (status, body) = get(addr, "/__livereload.js").await;
        assert_eq!(status, 200);
        assert!(!body.contains("new WebSocket"));
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let (_temp, config) = site();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = DevServer::new(config, ReloadHub::new());
        let handle = tokio::spawn(server.serve(listener, async {
            let _ = stop_rx.await;
        }));
        stop_tx.send(()).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
