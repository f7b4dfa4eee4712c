//! HTTP workload issuing unauthenticated `GET` requests against a target.

use std::time::Duration;

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _, ErrorExt as _},
    http::{
        Body, HeaderValue, Request, Response, Uri, body::util::BodyExt as _,
        client::EasyHttpWebClient, header::USER_AGENT,
    },
    layer::MapErrLayer,
    rt::Executor,
    service::BoxService,
    telemetry::tracing,
};
use tokio::time::Instant;

use crate::{
    scenario::{FailureKind, RequestOutcome, Workload},
    utils::env::user_agent,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared, pooled web client used by all workers of a run.
pub fn new_web_client(exec: Executor) -> Result<BoxService<Request, Response, BoxError>, BoxError> {
    let client = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for web client")?
        .build_client();

    Ok(MapErrLayer::new(BoxError::from)
        .into_layer(client)
        .boxed())
}

/// Turn a `host:port` target (or a full uri) into the uri requested by workers.
pub fn target_uri(target: &str) -> Result<Uri, BoxError> {
    let raw = if target.contains("://") {
        target.to_owned()
    } else {
        format!("http://{target}/")
    };
    let uri: Uri = raw
        .parse()
        .context("parse target uri")
        .with_context_field("target", || target.to_owned())?;
    if uri.host().is_none() {
        return Err(BoxError::from("target uri has no host").context_field("target", target.to_owned()));
    }
    Ok(uri)
}

/// One `GET` per iteration; status 200 is a success,
/// anything else (other status, transport error, timeout) a failure.
#[derive(Debug, Clone)]
pub struct HttpGetWorkload<S> {
    client: S,
    uri: Uri,
    timeout: Duration,
}

impl<S> HttpGetWorkload<S> {
    pub fn new(client: S, uri: Uri) -> Self {
        Self {
            client,
            uri,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    fn new_request(&self) -> Request {
        let mut req = Request::new(Body::empty());
        *req.uri_mut() = self.uri.clone();
        req.headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(user_agent()));
        req
    }
}

impl<S> Workload for HttpGetWorkload<S>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    async fn iterate(&self) -> RequestOutcome {
        let req = self.new_request();
        let start = Instant::now();

        // the body is part of the request time
        let result = tokio::time::timeout(self.timeout, async {
            let resp = self.client.serve(req).await?;
            let (parts, body) = resp.into_parts();
            body.collect().await.context("collect response body")?;
            Ok::<_, BoxError>(parts.status)
        })
        .await;
        let duration = start.elapsed();

        match result {
            Ok(Ok(status)) => RequestOutcome::from_status(status, duration),
            Ok(Err(err)) => {
                tracing::debug!(uri = %self.uri, "request failed: {err}");
                RequestOutcome::failed(FailureKind::Transport, duration)
            }
            Err(_) => {
                tracing::debug!(uri = %self.uri, timeout = ?self.timeout, "request timed out");
                RequestOutcome::failed(FailureKind::Timeout, duration)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rama::{
        http::{StatusCode, service::web::response::IntoResponse},
        service::service_fn,
    };

    use super::*;

    fn uri() -> Uri {
        target_uri("127.0.0.1:7878").unwrap()
    }

    #[test]
    fn test_target_uri() {
        assert_eq!(uri().to_string(), "http://127.0.0.1:7878/");
        assert_eq!(
            target_uri("http://localhost:8080/health").unwrap().path(),
            "/health"
        );
        assert!(target_uri("").is_err());
    }

    #[tokio::test]
    async fn test_ok_response_is_success() {
        let client = service_fn(async |req: Request| {
            assert_eq!(req.uri().path(), "/");
            assert_eq!(req.headers().get(USER_AGENT).unwrap(), user_agent());
            Ok::<_, BoxError>("ok".into_response())
        });

        let outcome = HttpGetWorkload::new(client, uri()).iterate().await;
        assert!(outcome.is_success());
        assert_eq!(outcome.status, Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let client = service_fn(async |_req: Request| {
            Ok::<_, BoxError>(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        });

        let outcome = HttpGetWorkload::new(client, uri()).iterate().await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(outcome.failure, Some(FailureKind::HttpStatus));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_transport_error_is_failure() {
        let client = service_fn(async |_req: Request| {
            Err::<Response, _>(BoxError::from("connection refused"))
        });

        let outcome = HttpGetWorkload::new(client, uri()).iterate().await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.failure, Some(FailureKind::Transport));
        assert!(logs_contain("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_times_out() {
        let client = service_fn(async |_req: Request| {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, BoxError>(StatusCode::OK.into_response())
        });

        let outcome = HttpGetWorkload::new(client, uri())
            .with_timeout(Duration::from_secs(1))
            .iterate()
            .await;
        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert_eq!(outcome.duration, Duration::from_secs(1));
    }
}
