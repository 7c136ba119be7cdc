//! Local HTTP fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use ferry::io::download::Downloader;
use ferry::transport::TransportPolicy;

/// Serves fixed bodies by exact path. Unknown paths get 404.
pub struct StaticServer {
    base: String,
}

impl StaticServer {
    pub async fn start(routes: Vec<(&str, Vec<u8>)>) -> Self {
        let files: HashMap<String, Vec<u8>> = routes
            .into_iter()
            .map(|(path, body)| (path.to_string(), body))
            .collect();
        let app = Router::new()
            .fallback(serve_file)
            .with_state(Arc::new(files));
        Self {
            base: spawn(app).await,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

async fn serve_file(
    State(files): State<Arc<HashMap<String, Vec<u8>>>>,
    uri: Uri,
) -> Response {
    match files.get(uri.path()) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Bind `app` to an ephemeral localhost port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Downloader whose temp files land in `dir`, so tests can check cleanup.
pub fn downloader_in(dir: &Path) -> Downloader {
    std::fs::create_dir_all(dir).expect("create download dir");
    Downloader::new(Duration::from_secs(10))
        .expect("downloader")
        .with_temp_dir(dir)
}

pub fn quick_policy(attempts: u32) -> TransportPolicy {
    TransportPolicy {
        poll_attempts: attempts,
        poll_interval: Duration::from_millis(5),
    }
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .expect("read dir")
        .next()
        .is_none()
}
