use async_trait::async_trait;
use prost_reflect::DescriptorPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::entities::LifecycleState;
use crate::error::HarnessError;
use crate::use_cases::{Dispatcher, MatchPolicy, MethodRoute};

/// Everything a runtime needs to serve the stub
pub struct ServeConfig {
    pub routes: Vec<MethodRoute>,
    pub dispatcher: Arc<Dispatcher>,
    pub match_policy: MatchPolicy,
    /// Serve `grpc.health.v1.Health/Check`
    pub health_check: bool,
    /// Serve gRPC server reflection from these descriptor pools
    pub reflection: Option<Vec<DescriptorPool>>,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

/// Trait for gRPC server implementations
#[async_trait]
pub trait Server: Send + Sync + Clone {
    /// Bind the listener and start accepting calls in the background
    ///
    /// Returns once the listener is bound.
    async fn serve(&self, config: ServeConfig) -> Result<Box<dyn ServerHandle>, HarnessError>;
}

/// Handle on a running server
#[async_trait]
pub trait ServerHandle: Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting, drain in-flight calls for at most `drain_timeout`,
    /// then force-close whatever is left.
    ///
    /// Returns `true` when the drain completed before the timeout.
    async fn shutdown(&mut self, drain_timeout: Duration) -> Result<bool, HarnessError>;
}
