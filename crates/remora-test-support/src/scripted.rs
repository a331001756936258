//! In-memory [`Transport`] that replays scripted responses.
//!
//! Responses are queued per method and consumed in order. A "sticky" reply
//! answers every call once the queue for that method is empty. Calls to a
//! held method block until the test releases them one permit at a time,
//! which lets a test observe a request while it is still in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use remora_rpc::{RpcError, RpcRequest, RpcResponse, RpcResult, STATUS_OK, Transport};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

#[derive(Clone)]
struct Scripted {
    status: i64,
    response: RpcResponse,
}

impl Scripted {
    fn success(arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            status: STATUS_OK,
            response: RpcResponse::success(arguments),
        }
    }

    fn failure(status: i64) -> Self {
        Self {
            status,
            response: RpcResponse::default(),
        }
    }

    fn into_result(self) -> RpcResult<RpcResponse> {
        match RpcError::from_status(self.status, Some(&self.response)) {
            Some(err) => Err(err),
            None => Ok(self.response),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Scripted>>,
    sticky: HashMap<String, Scripted>,
    gates: HashMap<String, Arc<Semaphore>>,
    log: Vec<RpcRequest>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Scripted transport double.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    /// Create an empty script. Unscripted calls fail with a protocol error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    /// Queue a successful reply carrying `arguments` for the next `method` call.
    pub fn reply(&self, method: &str, arguments: Value) {
        self.enqueue(method, Scripted::success(arguments));
    }

    /// Queue a failure for the next `method` call, encoded as a dispatch status
    /// (for example `FAIL_JSON_DECODE`, `-504` for HTTP 404, or `28` for a timeout).
    pub fn fail(&self, method: &str, status: i64) {
        self.enqueue(method, Scripted::failure(status));
    }

    /// Queue a daemon-side failure with the given `result` string.
    pub fn reject(&self, method: &str, result: &str) {
        self.enqueue(
            method,
            Scripted {
                status: remora_rpc::FAIL_RESPONSE_UNSUCCESSFUL,
                response: RpcResponse {
                    result: Some(result.to_string()),
                    ..RpcResponse::default()
                },
            },
        );
    }

    /// Answer every otherwise-unscripted `method` call with `arguments`.
    pub fn reply_always(&self, method: &str, arguments: Value) {
        self.with_script(|script| {
            script
                .sticky
                .insert(method.to_string(), Scripted::success(arguments));
        });
    }

    /// Fail every otherwise-unscripted `method` call with `status`.
    pub fn fail_always(&self, method: &str, status: i64) {
        self.with_script(|script| {
            script
                .sticky
                .insert(method.to_string(), Scripted::failure(status));
        });
    }

    /// Block `method` calls until [`ScriptedTransport::release`] grants permits.
    pub fn hold(&self, method: &str) {
        self.with_script(|script| {
            script
                .gates
                .insert(method.to_string(), Arc::new(Semaphore::new(0)));
        });
    }

    /// Let `count` held `method` calls proceed.
    pub fn release(&self, method: &str, count: usize) {
        if let Some(gate) = self.with_script(|script| script.gates.get(method).cloned()) {
            gate.add_permits(count);
        }
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.with_script(|script| script.log.clone())
    }

    /// Requests received for `method`.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> Vec<RpcRequest> {
        self.with_script(|script| {
            script
                .log
                .iter()
                .filter(|request| request.method == method)
                .cloned()
                .collect()
        })
    }

    /// Number of `method` requests received (held or answered).
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.with_script(|script| {
            script
                .log
                .iter()
                .filter(|request| request.method == method)
                .count()
        })
    }

    /// Highest number of `method` requests observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self, method: &str) -> usize {
        self.with_script(|script| script.max_in_flight.get(method).copied().unwrap_or(0))
    }

    fn enqueue(&self, method: &str, scripted: Scripted) {
        self.with_script(|script| {
            script
                .queued
                .entry(method.to_string())
                .or_default()
                .push_back(scripted);
        });
    }

    fn next_reply(&self, method: &str) -> RpcResult<RpcResponse> {
        let scripted = self.with_script(|script| {
            if let Some(count) = script.in_flight.get_mut(method) {
                *count = count.saturating_sub(1);
            }
            script
                .queued
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.sticky.get(method).cloned())
        });
        scripted.map_or_else(
            || {
                Err(RpcError::Protocol {
                    message: Some(format!("no scripted response for {method}")),
                })
            },
            Scripted::into_result,
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dispatch(&self, request: RpcRequest) -> RpcResult<RpcResponse> {
        let method = request.method.clone();
        let gate = self.with_script(|script| {
            script.log.push(request);
            let in_flight = script.in_flight.entry(method.clone()).or_default();
            *in_flight += 1;
            let current = *in_flight;
            let max = script.max_in_flight.entry(method.clone()).or_default();
            *max = (*max).max(current);
            script.gates.get(&method).cloned()
        });

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.next_reply(&method)
    }
}
