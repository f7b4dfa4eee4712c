use std::{convert::Infallible, sync::Arc, time::Duration};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue, Request, Response, StatusCode,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::response::IntoResponse,
    },
    layer::TimeoutLayer,
    net::address::SocketAddress,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use clap::Args;
use loadcmp_lib::utils::env;

#[derive(Debug, Clone, Args)]
/// run a stub target server
pub struct MockCommand {
    /// socket address to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "ADDRESS",
        default_value = "127.0.0.1:7878"
    )]
    pub bind: SocketAddress,

    /// latency added to every response
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    base_latency: f64,

    /// random deviation (+/-) around the base latency
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    jitter: f64,

    /// fraction of requests answered with a 500
    #[arg(long, default_value_t = 0.)]
    error_rate: f32,
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> Result<(), BoxError> {
    let exec = Executor::graceful(guard);

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(env::project_name())),
    )
        .into_layer(MockHttpServer::try_new(
            args.base_latency,
            args.jitter,
            args.error_rate,
        )?);

    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));
    let tcp_svc = TimeoutLayer::new(Duration::from_secs(60)).into_layer(http_server);

    let tcp_listener = TcpListener::bind(args.bind, exec)
        .await
        .context("bind mock http server")?;

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock http server")?;
    tracing::info!("mock http server bound to: {server_addr}");

    tcp_listener.serve(tcp_svc).await;

    Ok(())
}

#[derive(Debug)]
struct MockHttpServer {
    base_latency: f64,
    jitter: f64,
    error_rate: f32,
}

impl MockHttpServer {
    fn try_new(base_latency: f64, jitter: f64, error_rate: f32) -> Result<Self, BoxError> {
        if !(0. ..=1.).contains(&error_rate) {
            return Err(BoxError::from("error_rate must be within [0, 1]"));
        }
        if !base_latency.is_finite() || !jitter.is_finite() {
            return Err(BoxError::from("latency and jitter must be finite"));
        }
        Ok(Self {
            base_latency,
            jitter,
            error_rate,
        })
    }

    fn pick_outcome(&self) -> MockOutcome {
        let r: f32 = rand::random();
        if r < self.error_rate {
            MockOutcome::Error
        } else {
            MockOutcome::Ok
        }
    }

    fn compute_delay(&self) -> Duration {
        let base = self.base_latency.max(0.0);
        let jitter = self.jitter.max(0.0);

        if jitter == 0.0 {
            return Duration::from_secs_f64(base);
        }

        let u: f64 = rand::random();
        let delta = (u * jitter * 2.0) - jitter;
        Duration::from_secs_f64((base + delta).max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockOutcome {
    Error,
    Ok,
}

impl Service<Request> for MockHttpServer {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, _req: Request) -> Result<Self::Output, Self::Error> {
        let delay = self.compute_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(match self.pick_outcome() {
            MockOutcome::Error => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            MockOutcome::Ok => "ok".into_response(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rama::http::Body;

    use super::*;

    #[test]
    fn test_invalid_config() {
        assert!(MockHttpServer::try_new(0., 0., 1.5).is_err());
        assert!(MockHttpServer::try_new(f64::NAN, 0., 0.).is_err());
        assert!(MockHttpServer::try_new(0.1, 0.05, 0.5).is_ok());
    }

    #[test]
    fn test_compute_delay_bounds() {
        let server = MockHttpServer::try_new(0.1, 0.05, 0.).unwrap();
        for _ in 0..1000 {
            let delay = server.compute_delay();
            assert!(delay >= Duration::from_millis(50), "delay: {delay:?}");
            assert!(delay <= Duration::from_millis(150), "delay: {delay:?}");
        }

        let server = MockHttpServer::try_new(0.01, 1., 0.).unwrap();
        for _ in 0..1000 {
            assert!(server.compute_delay() <= Duration::from_millis(1010));
        }

        let fixed = MockHttpServer::try_new(0.2, 0., 0.).unwrap();
        assert_eq!(fixed.compute_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_pick_outcome_extremes() {
        let never = MockHttpServer::try_new(0., 0., 0.).unwrap();
        let always = MockHttpServer::try_new(0., 0., 1.).unwrap();
        for _ in 0..1000 {
            assert_eq!(never.pick_outcome(), MockOutcome::Ok);
            assert_eq!(always.pick_outcome(), MockOutcome::Error);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_applies_latency() {
        let server = MockHttpServer::try_new(0.25, 0., 0.).unwrap();
        let start = tokio::time::Instant::now();
        let resp = server.serve(Request::new(Body::empty())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(start.elapsed(), Duration::from_millis(250));

        let failing = MockHttpServer::try_new(0., 0., 1.).unwrap();
        let resp = failing.serve(Request::new(Body::empty())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
