// HTTP/1.1 server adapter
//
// Bridges hyper connections to `Router::serve`. Each accepted connection is
// served on its own task.

use crate::{Error, HttpRequest, HttpResponse, Router};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request, Response};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// HTTP server serving one router.
pub struct Server {
    router: Arc<Router>,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn from_shared(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Serve on `addr` until the process ends.
    pub async fn listen(self, addr: SocketAddr) -> Result<(), Error> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Serve on `addr` until `shutdown` resolves.
    ///
    /// Only the accept loop stops; connections already accepted run to
    /// completion on their own tasks.
    pub async fn serve_with_shutdown<S>(self, addr: SocketAddr, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves.
    pub async fn serve_listener<S>(self, listener: TcpListener, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        info!(addr = ?listener.local_addr().ok(), "Server listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            debug!(peer = %peer, "Connection accepted");
            let io = TokioIo::new(stream);
            let router = self.router.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let router = router.clone();
                    async move { handle_request(req, router).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<IncomingBody>,
    router: Arc<Router>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let response = router.serve(to_http_request(parts, body)).await;
    Ok(to_hyper_response(response))
}

/// Convert hyper request parts into an [`HttpRequest`].
///
/// The path keeps its query string; the router splits it off. Repeated
/// `Cookie` headers are merged into one.
pub fn to_http_request(parts: ::http::request::Parts, body: Bytes) -> HttpRequest {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut request = HttpRequest::new(parts.method.as_str(), target);
    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let separator = if name.as_str() == "cookie" { "; " } else { ", " };
        request
            .headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    request.body = body.to_vec();
    request
}

/// Convert an [`HttpResponse`] into a hyper response, one `Set-Cookie`
/// header per cookie.
pub fn to_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);

    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    for cookie in &response.cookies {
        builder = builder.header(::http::header::SET_COOKIE, cookie.to_header_value());
    }

    match builder.body(Full::new(Bytes::from(response.body))) {
        Ok(res) => res,
        Err(err) => {
            error!(error = %err, "Invalid response produced by handler");
            let mut fallback = Response::new(Full::new(Bytes::from_static(
                b"Internal Server Error",
            )));
            *fallback.status_mut() = ::http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;

    #[test]
    fn test_to_http_request_keeps_query_and_merges_cookies() {
        let req = Request::builder()
            .method("POST")
            .uri("http://localhost/items/3?sort=asc")
            .header("Cookie", "a=1")
            .header("Cookie", "b=2")
            .header("X-Trace", "t1")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();

        let request = to_http_request(parts, Bytes::from_static(b"payload"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/items/3?sort=asc");
        assert_eq!(request.cookie("a"), Some("1".to_string()));
        assert_eq!(request.cookie("b"), Some("2".to_string()));
        assert_eq!(request.header("x-trace"), Some("t1"));
        assert_eq!(request.body, b"payload");
    }

    #[test]
    fn test_to_hyper_response_emits_each_cookie() {
        let mut response = HttpResponse::ok().with_body(b"hi".to_vec());
        response.set_cookie(Cookie::new("a", "1"));
        response.set_cookie(Cookie::expired("b"));

        let res = to_hyper_response(response);
        assert_eq!(res.status(), ::http::StatusCode::OK);
        let cookies: Vec<_> = res
            .headers()
            .get_all(::http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("a=1"));
        assert!(cookies[1].contains("Max-Age=0"));
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        let res = to_hyper_response(HttpResponse::new(42));
        assert_eq!(res.status(), ::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_stops_accept_loop() {
        let router = Router::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(router);

        let result = server.serve_listener(listener, async {}).await;
        assert!(result.is_ok());
    }
}
