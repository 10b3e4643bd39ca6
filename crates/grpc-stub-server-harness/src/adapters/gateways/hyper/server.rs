use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tonic::Status;
use tracing::{debug, info, warn};

use super::body::ChannelBody;
use super::call::HyperCall;
use super::framing::{grpc_timeout, GRPC_CONTENT_TYPE};
use super::health::{HealthReporter, HEALTH_CHECK_PATH};
use super::reflection::{ReflectionService, REFLECTION_PATH, REFLECTION_V1ALPHA_PATH};
use crate::error::HarnessError;
use crate::use_cases::ports::{ServeConfig, Server, ServerHandle};
use crate::use_cases::{Dispatcher, MatchPolicy, MethodRoute};

/// Largest request message accepted, matching the usual gRPC default
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Response frames buffered per call before `send` waits on the client
const FRAME_BUFFER: usize = 16;

/// gRPC server speaking HTTP/2 through hyper
#[derive(Clone)]
pub struct Hyper {
    addr: SocketAddr,
    max_message_size: usize,
}

impl Hyper {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self::new(addr.into())
    }

    /// Reject request messages larger than `bytes` with `RESOURCE_EXHAUSTED`
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }
}

impl Default for Hyper {
    fn default() -> Self {
        Self::new(([127, 0, 0, 1], 0).into())
    }
}

/// State shared with every connection
struct ServerState {
    /// Map from "/package.Service/Method" to routes
    routes: HashMap<String, MethodRoute>,
    dispatcher: Arc<Dispatcher>,
    match_policy: MatchPolicy,
    health: Option<Arc<HealthReporter>>,
    reflection: Option<Arc<ReflectionService>>,
    max_message_size: usize,
}

impl ServerState {
    fn new(config: ServeConfig, max_message_size: usize) -> Self {
        let health = config
            .health_check
            .then(|| HealthReporter::spawn(config.lifecycle.clone()));
        let reflection = config
            .reflection
            .map(|pools| Arc::new(ReflectionService::new(pools)));
        let routes = config
            .routes
            .into_iter()
            .map(|route| (route.method().path(), route))
            .collect();

        Self {
            routes,
            dispatcher: config.dispatcher,
            match_policy: config.match_policy,
            health,
            reflection,
            max_message_size,
        }
    }
}

enum Target {
    Route(MethodRoute),
    Health(Arc<HealthReporter>),
    Reflection(Arc<ReflectionService>),
}

fn trailers_only(status: Status) -> Response<ChannelBody> {
    let mut response = Response::new(ChannelBody::empty());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    if let Err(e) = status.add_header(headers) {
        warn!(error = %e, "failed to encode status headers");
    }
    response
}

async fn handle_grpc_request(
    state: Arc<ServerState>,
    req: Request<Incoming>,
) -> Result<Response<ChannelBody>, Infallible> {
    let path = req.uri().path().to_string();

    if req.method() != hyper::Method::POST {
        return Ok(trailers_only(Status::unimplemented(format!(
            "{} is not a gRPC method",
            req.method()
        ))));
    }

    let target = match state.routes.get(&path) {
        Some(route) => Target::Route(route.clone()),
        None => match (path.as_str(), &state.health, &state.reflection) {
            (HEALTH_CHECK_PATH, Some(health), _) => Target::Health(Arc::clone(health)),
            (REFLECTION_PATH | REFLECTION_V1ALPHA_PATH, _, Some(reflection)) => {
                Target::Reflection(Arc::clone(reflection))
            }
            _ => {
                debug!(%path, "call to unknown method");
                return Ok(trailers_only(Status::unimplemented(format!(
                    "unknown method {path}"
                ))));
            }
        },
    };

    let (head_tx, head_rx) = oneshot::channel();
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    let (parts, body) = req.into_parts();
    let deadline = grpc_timeout(&parts.headers);
    let mut call = HyperCall::new(
        &parts.headers,
        body,
        state.max_message_size,
        head_tx,
        frames_tx,
    );

    // The call runs on its own task so the response head can go out while
    // the handler is still reading the request stream.
    tokio::spawn(async move {
        let handled = async {
            match target {
                Target::Route(route) => {
                    route
                        .handle(&state.dispatcher, state.match_policy, &mut call)
                        .await
                }
                Target::Health(health) => health.check(&mut call).await,
                Target::Reflection(reflection) => reflection.serve(&mut call).await,
            }
        };
        let result = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, handled)
                .await
                .unwrap_or_else(|_| Err(Status::deadline_exceeded("deadline exceeded"))),
            None => handled.await,
        };
        call.finish(result).await;
    });

    match head_rx.await {
        Ok(headers) => {
            let mut response = Response::new(ChannelBody::new(frames_rx));
            *response.headers_mut() = headers;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
            Ok(response)
        }
        Err(_) => Ok(trailers_only(Status::internal("call ended without a response"))),
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<Option<Duration>>,
) {
    let service = service_fn(move |req| handle_grpc_request(Arc::clone(&state), req));
    let conn = http2::Builder::new(TokioExecutor::new()).serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(%peer, error = %e, "connection closed with error");
                }
                break;
            }
            _ = shutdown.changed(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}

/// Accept until told to stop, then drain
///
/// Returns `true` when every connection finished within the drain timeout.
async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<Option<Duration>>,
) -> bool {
    let mut connections = JoinSet::new();

    let drain_timeout = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&state),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break Duration::ZERO;
                }
                if let Some(timeout) = *shutdown.borrow_and_update() {
                    break timeout;
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    };

    drop(listener);
    info!(connections = connections.len(), "listener closed, draining connections");

    let drained = tokio::time::timeout(drain_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await
    .is_ok();
    if !drained {
        connections.abort_all();
    }
    drained
}

struct HyperHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<Option<Duration>>,
    task: Option<JoinHandle<bool>>,
}

#[async_trait]
impl ServerHandle for HyperHandle {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn shutdown(&mut self, drain_timeout: Duration) -> Result<bool, HarnessError> {
        let task = self
            .task
            .take()
            .ok_or_else(|| HarnessError::UsageError("server already shut down".to_string()))?;
        self.shutdown.send_replace(Some(drain_timeout));
        task.await
            .map_err(|e| HarnessError::ServerError(format!("accept loop failed: {e}")))
    }
}

#[async_trait]
impl Server for Hyper {
    async fn serve(&self, config: ServeConfig) -> Result<Box<dyn ServerHandle>, HarnessError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;

        let state = Arc::new(ServerState::new(config, self.max_message_size));
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let task = tokio::spawn(accept_loop(listener, state, shutdown_rx));

        Ok(Box::new(HyperHandle {
            local_addr,
            shutdown: shutdown_tx,
            task: Some(task),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailers_only_response() {
        let response = trailers_only(Status::unimplemented("unknown method /x.Y/Z"));
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], GRPC_CONTENT_TYPE);
        assert_eq!(headers["grpc-status"], "12");
        assert_eq!(headers["grpc-message"], "unknown%20method%20/x.Y/Z");

        let status = Status::from_header_map(headers).unwrap();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
        assert_eq!(status.message(), "unknown method /x.Y/Z");
    }

    #[test]
    fn test_status_message_encoding() {
        let response = trailers_only(Status::not_found("caf\u{e9}\n"));
        assert_eq!(response.headers()["grpc-status"], "5");
        assert_eq!(response.headers()["grpc-message"], "caf%C3%A9%0A");

        let ok = trailers_only(Status::ok(""));
        assert_eq!(ok.headers()["grpc-status"], "0");
        assert!(!ok.headers().contains_key("grpc-message"));
    }

    #[test]
    fn test_hyper_defaults() {
        let server = Hyper::default();
        assert_eq!(server.addr, SocketAddr::from(([127, 0, 0, 1], 0)));
        assert_eq!(server.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(Hyper::default().with_max_message_size(16).max_message_size, 16);
    }

    #[tokio::test]
    async fn test_serve_binds_and_shuts_down() {
        let lifecycle = crate::entities::Lifecycle::new();
        let config = ServeConfig {
            routes: Vec::new(),
            dispatcher: Arc::new(Dispatcher::new()),
            match_policy: MatchPolicy::default(),
            health_check: false,
            reflection: None,
            lifecycle: lifecycle.subscribe(),
        };

        let mut handle = Hyper::default().serve(config).await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        assert!(TcpStream::connect(handle.local_addr()).await.is_ok());

        assert!(handle.shutdown(Duration::from_millis(100)).await.is_ok());
        assert!(matches!(
            handle.shutdown(Duration::from_millis(100)).await,
            Err(HarnessError::UsageError(_))
        ));
    }
}
