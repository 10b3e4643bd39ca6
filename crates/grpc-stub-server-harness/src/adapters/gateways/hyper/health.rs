use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::sync::watch;
use tokio::time;
use tonic::Status;

use crate::entities::LifecycleState;
use crate::use_cases::ports::ServerCall;

pub(super) const HEALTH_CHECK_PATH: &str = "/grpc.health.v1.Health/Check";

const FLAP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, PartialEq, Message)]
pub(super) struct HealthCheckRequest {
    #[prost(string, tag = "1")]
    pub service: String,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct HealthCheckResponse {
    #[prost(enumeration = "ServingStatus", tag = "1")]
    pub status: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub(super) enum ServingStatus {
    Unknown = 0,
    Serving = 1,
    NotServing = 2,
    ServiceUnknown = 3,
}

/// Answers `grpc.health.v1.Health/Check`
///
/// `""` and `"default"` are always serving. `"flapping"` alternates between
/// serving and not serving while the endpoint starts up, settles on serving
/// once it is, and reports not serving from the moment it starts closing.
pub(super) struct HealthReporter {
    flapping: Arc<AtomicBool>,
}

impl HealthReporter {
    pub(super) fn spawn(lifecycle: watch::Receiver<LifecycleState>) -> Arc<Self> {
        let flapping = Arc::new(AtomicBool::new(true));
        tokio::spawn(flap(Arc::clone(&flapping), lifecycle));
        Arc::new(Self { flapping })
    }

    pub(super) fn status(&self, service: &str) -> Option<ServingStatus> {
        match service {
            "" | "default" => Some(ServingStatus::Serving),
            "flapping" if self.flapping.load(Ordering::SeqCst) => Some(ServingStatus::Serving),
            "flapping" => Some(ServingStatus::NotServing),
            _ => None,
        }
    }

    pub(super) async fn check<C>(&self, call: &mut C) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let bytes = call
            .recv()
            .await?
            .ok_or_else(|| Status::internal("missing request message"))?;
        let request = HealthCheckRequest::decode(bytes)
            .map_err(|e| Status::internal(format!("failed to decode request: {e}")))?;
        let status = self
            .status(&request.service)
            .ok_or_else(|| Status::not_found(format!("unknown service {:?}", request.service)))?;

        let response = HealthCheckResponse {
            status: status as i32,
        };
        call.send(Bytes::from(response.encode_to_vec())).await
    }
}

async fn flap(serving: Arc<AtomicBool>, mut lifecycle: watch::Receiver<LifecycleState>) {
    let mut ticker = time::interval(FLAP_INTERVAL);
    ticker.tick().await;

    loop {
        let state = *lifecycle.borrow_and_update();
        if state.is_shutting_down() {
            break;
        }
        let steady = state == LifecycleState::Serving;
        if steady {
            serving.store(true, Ordering::SeqCst);
        }

        tokio::select! {
            _ = ticker.tick(), if !steady => {
                serving.fetch_xor(true, Ordering::SeqCst);
            }
            changed = lifecycle.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    serving.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Lifecycle;

    #[tokio::test]
    async fn test_static_services() {
        let lifecycle = Lifecycle::new();
        let reporter = HealthReporter::spawn(lifecycle.subscribe());

        assert_eq!(reporter.status(""), Some(ServingStatus::Serving));
        assert_eq!(reporter.status("default"), Some(ServingStatus::Serving));
        assert_eq!(reporter.status("routeguide.RouteGuide"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_toggles_while_starting() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Starting).unwrap();
        let reporter = HealthReporter::spawn(lifecycle.subscribe());

        let initial = reporter.status("flapping");
        time::sleep(Duration::from_millis(150)).await;
        assert_ne!(reporter.status("flapping"), initial);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reporter.status("flapping"), initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_settles_once_serving() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Starting).unwrap();
        let reporter = HealthReporter::spawn(lifecycle.subscribe());
        time::sleep(Duration::from_millis(150)).await;

        lifecycle.transition(LifecycleState::Serving).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reporter.status("flapping"), Some(ServingStatus::Serving));
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(reporter.status("flapping"), Some(ServingStatus::Serving));

        lifecycle.transition(LifecycleState::Closing).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reporter.status("flapping"), Some(ServingStatus::NotServing));
    }

    #[tokio::test]
    async fn test_flapping_stops_when_lifecycle_dropped() {
        let lifecycle = Lifecycle::new();
        let reporter = HealthReporter::spawn(lifecycle.subscribe());
        drop(lifecycle);
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reporter.status("flapping"), Some(ServingStatus::NotServing));
    }

    #[test]
    fn test_wire_messages() {
        let request = HealthCheckRequest {
            service: "flapping".to_string(),
        };
        let decoded = HealthCheckRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.service, "flapping");

        let response = HealthCheckResponse {
            status: ServingStatus::NotServing as i32,
        };
        assert_eq!(response.encode_to_vec(), vec![0x08, 0x02]);
    }
}
