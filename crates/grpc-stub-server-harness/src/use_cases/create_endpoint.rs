use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::entities::{Lifecycle, LifecycleState, Matcher, Method, Request};
use crate::error::HarnessError;
use crate::use_cases::ports::{Schema, ServeConfig, Server, ServerHandle};
use crate::use_cases::{Dispatcher, MatchPolicy, MethodRoute};

/// Upper bound on the graceful drain performed by [`Endpoint::close`]
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for starting stub endpoints with a fluent API
///
/// # Example
///
/// ```rust,no_run
/// use grpc_stub_server_harness::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), HarnessError> {
///     let mut schema = SchemaRegistry::new();
///     schema.register_bytes(&std::fs::read("routeguide.pb")?)?;
///
///     let endpoint = EndpointBuilder::new()
///         .server(Hyper::default())
///         .schema(schema)
///         .start()
///         .await?;
///
///     endpoint.method("GetFeature").response(json!({"name": "hello"}));
///
///     // ... point a client at endpoint.url()? ...
///
///     endpoint.close().await?;
///     Ok(())
/// }
/// ```
pub struct EndpointBuilder<S> {
    server: Option<S>,
    schemas: Vec<Box<dyn Schema>>,
    health_check: bool,
    reflection: bool,
    match_policy: MatchPolicy,
    drain_timeout: Duration,
}

impl EndpointBuilder<()> {
    /// Create a new endpoint builder
    pub fn new() -> Self {
        Self {
            server: None,
            schemas: Vec::new(),
            health_check: false,
            reflection: false,
            match_policy: MatchPolicy::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl Default for EndpointBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> EndpointBuilder<S> {
    /// Set the server implementation to use
    pub fn server<NewS: Server>(self, server: NewS) -> EndpointBuilder<NewS> {
        EndpointBuilder {
            server: Some(server),
            schemas: self.schemas,
            health_check: self.health_check,
            reflection: self.reflection,
            match_policy: self.match_policy,
            drain_timeout: self.drain_timeout,
        }
    }

    /// Add a schema whose methods the endpoint serves
    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schemas.push(Box::new(schema));
        self
    }

    /// Also serve `grpc.health.v1.Health/Check`
    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Also serve gRPC server reflection (`v1` and `v1alpha`) for the schemas
    pub fn reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }

    /// How many matchers answer a message on streaming-response calls
    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl<S: Server + 'static> EndpointBuilder<S> {
    /// Bind the listener and start serving
    pub async fn start(self) -> Result<Endpoint, HarnessError> {
        let server = self.server.ok_or_else(|| {
            HarnessError::ConfigurationError("server must be set before starting".to_string())
        })?;

        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Starting)?;

        let routes = collect_routes(&self.schemas);
        if routes.is_empty() {
            warn!("schema defines no methods, every call will be unimplemented");
        }
        let methods: Vec<Method> = routes.iter().map(|r| r.method().clone()).collect();

        let dispatcher = Arc::new(Dispatcher::new());
        let config = ServeConfig {
            routes,
            dispatcher: Arc::clone(&dispatcher),
            match_policy: self.match_policy,
            health_check: self.health_check,
            reflection: self
                .reflection
                .then(|| self.schemas.iter().filter_map(|s| s.descriptor_pool()).collect()),
            lifecycle: lifecycle.subscribe(),
        };

        let handle = match server.serve(config).await {
            Ok(handle) => handle,
            Err(e) => {
                lifecycle.transition(LifecycleState::Closed)?;
                return Err(e);
            }
        };
        let local_addr = handle.local_addr();
        lifecycle.transition(LifecycleState::Serving)?;
        info!(%local_addr, methods = methods.len(), "stub endpoint serving");

        Ok(Endpoint {
            dispatcher,
            methods,
            lifecycle,
            local_addr,
            handle: Mutex::new(Some(handle)),
            drain_timeout: self.drain_timeout,
        })
    }
}

fn collect_routes(schemas: &[Box<dyn Schema>]) -> Vec<MethodRoute> {
    let mut seen = HashSet::new();
    let mut routes = Vec::new();
    for route in schemas.iter().flat_map(|schema| schema.routes()) {
        let path = route.method().path();
        if seen.insert(path.clone()) {
            routes.push(route);
        } else {
            warn!(%path, "method defined by more than one schema, keeping the first");
        }
    }
    routes
}

/// A running stub endpoint
///
/// Matchers can be registered at any time; calls that arrive before a
/// matching rule exists fail with `NOT_FOUND`.
pub struct Endpoint {
    dispatcher: Arc<Dispatcher>,
    methods: Vec<Method>,
    lifecycle: Lifecycle,
    local_addr: SocketAddr,
    handle: Mutex<Option<Box<dyn ServerHandle>>>,
    drain_timeout: Duration,
}

impl Endpoint {
    pub fn builder() -> EndpointBuilder<()> {
        EndpointBuilder::new()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Address the listener is bound to
    pub fn addr(&self) -> Result<SocketAddr, HarnessError> {
        self.ensure_serving()?;
        Ok(self.local_addr)
    }

    /// `http://<addr>`, ready to hand to a client
    pub fn url(&self) -> Result<String, HarnessError> {
        Ok(format!("http://{}", self.addr()?))
    }

    /// Methods served, as read from the schema
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn add_matcher(&self, matcher: Matcher) -> Arc<Matcher> {
        self.dispatcher.add_matcher(matcher)
    }

    /// Register a matcher with a custom predicate
    pub fn match_fn<F>(&self, f: F) -> Arc<Matcher>
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.dispatcher.match_fn(f)
    }

    /// Register a matcher for every method of `service`
    pub fn service(&self, service: &str) -> Arc<Matcher> {
        self.dispatcher.service(service)
    }

    /// Register a matcher for `method` (bare name or `pkg.Service/Method`)
    pub fn method(&self, method: &str) -> Arc<Matcher> {
        self.dispatcher.method(method)
    }

    /// Every request received so far, in receipt order
    pub fn requests(&self) -> Vec<Arc<Request>> {
        self.dispatcher.requests()
    }

    /// Stop serving
    ///
    /// In-flight calls get [`EndpointBuilder::drain_timeout`] to finish before
    /// their connections are dropped. The endpoint cannot be restarted.
    pub async fn close(&self) -> Result<(), HarnessError> {
        self.lifecycle.transition(LifecycleState::Closing)?;
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let result = match handle {
            Some(mut handle) => handle.shutdown(self.drain_timeout).await.map(|drained| {
                if drained {
                    info!("stub endpoint drained and closed");
                } else {
                    warn!("drain timeout expired, remaining connections were closed");
                }
            }),
            None => Ok(()),
        };
        self.lifecycle.transition(LifecycleState::Closed)?;
        result
    }

    fn ensure_serving(&self) -> Result<(), HarnessError> {
        match self.lifecycle.state() {
            LifecycleState::Serving => Ok(()),
            state => Err(HarnessError::UsageError(format!(
                "endpoint is {state}, not serving"
            ))),
        }
    }
}
