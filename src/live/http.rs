use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use camino::Utf8PathBuf;
use console::style;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::engine::CancellationToken;
use crate::error::WatchError;

const CLIENT: &str = include_str!("client.js");
const CLIENT_PATH: &str = "/__tasuki/live.js";
const CLIENT_TAG: &str = "<script src=\"/__tasuki/live.js\"></script>";

#[derive(Clone)]
struct Live {
    script: Arc<str>,
}

/// Binds the dev server socket on localhost. Port 0 picks a free port.
pub async fn bind(port: u16) -> Result<TcpListener, WatchError> {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(address)
        .await
        .map_err(|e| WatchError::Bind(address.to_string(), e))
}

/// Serves `root` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    root: Utf8PathBuf,
    reload_port: u16,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let port = listener.local_addr()?.port();
    tracing::info!(url = %style(format!("http://localhost:{port}/")).yellow(), "serving {root}");

    axum::serve(listener, router(root, reload_port))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::debug!("http server stopped");
    Ok(())
}

fn router(root: Utf8PathBuf, reload_port: u16) -> Router {
    let live = Live {
        script: CLIENT.replace("__PORT__", &reload_port.to_string()).into(),
    };

    Router::new()
        .route(CLIENT_PATH, get(client))
        .fallback_service(ServeDir::new(root))
        .layer(middleware::from_fn(inject))
        .with_state(live)
}

async fn client(State(live): State<Live>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        live.script.to_string(),
    )
}

/// Adds the reload client to every HTML response.
async fn inject(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("couldn't read response body: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes), CLIENT_TAG);
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

/// Inserts `tag` before the last `</body>`, or appends it when there is none.
pub(crate) fn inject_script(html: &str, tag: &str) -> String {
    let mut out = String::with_capacity(html.len() + tag.len());
    match html.rfind("</body>") {
        Some(at) => {
            out.push_str(&html[..at]);
            out.push_str(tag);
            out.push_str(&html[at..]);
        }
        None => {
            out.push_str(html);
            out.push_str(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    #[test]
    fn test_inject_before_body() {
        let html = inject_script("<html><body><p>hi</p></body></html>", "<s></s>");
        assert_eq!(html, "<html><body><p>hi</p><s></s></body></html>");
    }

    #[test]
    fn test_inject_without_body() {
        assert_eq!(inject_script("<p>hi</p>", "<s></s>"), "<p>hi</p><s></s>");
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_with_client() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("index.html"), "<html><body><p>hi</p></body></html>").unwrap();
        fs::write(root.join("demo.css"), ".a{color:red}").unwrap();

        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, root, 4321, cancel.clone()));

        let page = get(port, "/index.html").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains(&format!("<p>hi</p>{CLIENT_TAG}</body>")));

        let css = get(port, "/demo.css").await;
        assert!(css.ends_with(".a{color:red}"));
        assert!(!css.contains(CLIENT_TAG));

        let script = get(port, CLIENT_PATH).await;
        assert!(script.contains("4321"));
        assert!(!script.contains("__PORT__"));

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
