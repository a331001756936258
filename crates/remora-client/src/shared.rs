//! Handles shared by the coordinator, the poll loop and the dispatcher.

use std::sync::Arc;

use remora_events::{Event, EventBus};
use remora_rpc::{RpcRequest, RpcResponse, RpcResult, Transport};
use remora_telemetry::Metrics;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct Shared {
    transport: Arc<dyn Transport>,
    events: EventBus,
    metrics: Metrics,
}

impl Shared {
    pub(crate) fn new(transport: Arc<dyn Transport>, events: EventBus, metrics: Metrics) -> Self {
        Self {
            transport,
            events,
            metrics,
        }
    }

    pub(crate) const fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Publish an event and count it.
    pub(crate) fn emit(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.events.publish(event);
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.emit(Event::ErrorRaised {
            message: message.into(),
        });
    }

    pub(crate) fn status(&self, text: impl Into<String>) {
        self.emit(Event::StatusMessage { text: text.into() });
    }

    /// Dispatch a request, recording its outcome.
    pub(crate) async fn call(&self, request: RpcRequest) -> RpcResult<RpcResponse> {
        let method = request.method.clone();
        debug!(method = %method, "dispatching rpc request");
        let result = self.transport.dispatch(request).await;
        match &result {
            Ok(_) => self.metrics.inc_rpc_request(&method, "ok"),
            Err(err) => {
                self.metrics.inc_rpc_request(&method, "error");
                warn!(
                    method = %method,
                    status = err.status_code(),
                    error = %err.user_message(),
                    "rpc request failed"
                );
            }
        }
        result
    }
}
