use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use console::style;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::registry::REPORT_DIR;
use crate::router::{ReportRouter, Route};

/// Routes serving the reports of a build below `/{REPORT_DIR}/`.
pub fn routes(router: ReportRouter) -> Router {
    Router::new()
        .route(&format!("/{REPORT_DIR}/"), get(index))
        .route(&format!("/{REPORT_DIR}/{{*path}}"), get(report))
        .with_state(Arc::new(router))
}

/// Serves the reports on a separate thread.
pub fn start(address: SocketAddr, router: ReportRouter) -> thread::JoinHandle<anyhow::Result<()>> {
    info!(url = %style(format!("http://{address}/{REPORT_DIR}/")).yellow(), "starting a HTTP server");

    thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(address, router))
    })
}

async fn serve(address: SocketAddr, router: ReportRouter) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, routes(router)).await?;

    Ok(())
}

async fn index(State(router): State<Arc<ReportRouter>>, request: Request) -> Response {
    respond(&router, "", request).await
}

async fn report(
    State(router): State<Arc<ReportRouter>>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    respond(&router, &path, request).await
}

/// Streams the routed file, or answers 404 without a body.
pub(crate) async fn respond(router: &ReportRouter, path: &str, request: Request) -> Response {
    let file = match router.route(path) {
        Route::Artifact(report) => report.path.clone(),
        Route::File(file) => file,
        Route::NotFound => return StatusCode::NOT_FOUND.into_response(),
    };

    match ServeFile::new(&file).try_call(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            warn!(path = %file, "failed to serve a report file: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::to_bytes;
    use axum::http::header::CONTENT_TYPE;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::module::ModuleId;
    use crate::registry::{ReportArtifact, ReportRegistry};

    fn router(dir: &tempfile::TempDir) -> ReportRouter {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("org-a-default.html"), "<html>a</html>").unwrap();
        fs::write(root.join("style.css"), "body {}").unwrap();

        let report = ReportArtifact {
            module: ModuleId::new("org", "a"),
            configuration: Some("default".into()),
            path: root.join("org-a-default.html"),
        };
        ReportRouter::new(ReportRegistry::new(root, vec![report]))
    }

    fn get(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(&dir);

        let response = respond(&router, "/org$a", get("/ivyreport/org$a")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>a</html>");
    }

    #[tokio::test]
    async fn test_serves_sibling_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(&dir);

        let response = respond(&router, "style.css", get("/ivyreport/style.css")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn test_not_found_has_no_body() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(&dir);

        for path in ["org$b", "../secret", ""] {
            let response = respond(&router, path, get("/ivyreport/x")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert!(body.is_empty());
        }
    }
}
