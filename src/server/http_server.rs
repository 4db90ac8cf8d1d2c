use crate::metrics_provider::METRICS_PROVIDER;
use crate::server::handlers::{error_to_response, route};
use crate::server::{ResponseBody, ServerContext};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Serve one HTTP/1 connection.
///
/// The connection is asked to close gracefully when `shutdown` fires or when
/// the first timeout elapses, and is dropped once the second timeout elapses.
pub async fn serve_connection<S>(
    stream: TokioIo<S>,
    context: Arc<ServerContext>,
    timeouts: Arc<[Duration; 2]>,
    shutdown: CancellationToken,
) where
    S: Unpin + AsyncWrite + AsyncRead + Send + Debug + 'static,
{
    let conn = http1::Builder::new().serve_connection(
        stream,
        service_fn(move |request| handle_request(Arc::clone(&context), request)),
    );
    pin!(conn);

    METRICS_PROVIDER.metric_http_connections_in_flight.inc();

    let mut draining = false;
    'serve: for (iter, sleep_duration) in timeouts.iter().enumerate() {
        debug!("iter = {iter} sleep_duration = {sleep_duration:?}");
        let timeout = tokio::time::sleep(*sleep_duration);
        pin!(timeout);

        loop {
            tokio::select! {
                res = conn.as_mut() => {
                    match res {
                        Ok(()) => debug!("after polling conn, no error"),
                        Err(error) => debug!("error serving connection: {error}"),
                    }
                    break 'serve;
                }
                () = shutdown.cancelled(), if !draining => {
                    debug!("shutdown requested, calling conn.graceful_shutdown");
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                () = &mut timeout => {
                    debug!("iter = {iter} got timeout_interval, calling conn.graceful_shutdown");
                    conn.as_mut().graceful_shutdown();
                    break;
                }
            }
        }
    }

    METRICS_PROVIDER.metric_http_connections_in_flight.dec();
}

#[instrument(skip(context, request))]
async fn handle_request(
    context: Arc<ServerContext>,
    request: Request<Incoming>,
) -> Result<Response<ResponseBody>, Infallible> {
    let start_time = Instant::now();
    let method = request.method().to_owned();
    let path = request.uri().path().to_owned();

    let trace_id = {
        let context = Span::current().context();
        let span = context.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            Some(span_context.trace_id().to_string())
        } else {
            None
        }
    };

    let response = match route(&context, &method, &path) {
        Ok(response) => response,
        Err(error) => {
            if error.status().is_server_error() {
                error!("{method} {path} failed: {error}");
            }
            let details = trace_id
                .as_ref()
                .map(|trace_id| json!({"trace_id": trace_id}))
                .unwrap_or(json!({}));
            error_to_response(&error, details)
        }
    };

    #[allow(clippy::cast_precision_loss)]
    let elapsed = start_time.elapsed().as_millis() as f64;
    let status = response.status();

    METRICS_PROVIDER.metric_http_request_total.inc();
    METRICS_PROVIDER
        .metric_http_request_duration
        .observe(elapsed);

    let log = if let Some(trace_id) = trace_id {
        format!("{trace_id} {elapsed:?} - {status} {method} {path}")
    } else {
        format!("{elapsed:?} - {status} {method} {path}")
    };

    if status.is_server_error() {
        error!("{log}");
    } else {
        info!("{log}");
    }

    Ok(response)
}
