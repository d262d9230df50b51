//! # Command Dispatcher
//!
//! Maps one [`RpcRequest`] to exactly one [`RpcResponse`] echoing its `id`.
//!
//! ```text
//! request ──▶ method? ──▶ RpcMethod ──▶ CommandFactory::build ──▶ execute
//!               │             │                 │                   │
//!        "Missing method"  "Method not found"  "Invalid params"  "Operation failed"
//!                                                                 "Unauthorized" (Control)
//! ```
//!
//! Read and Write faults are logged with full detail and surfaced only as
//! `"Operation failed"`. A panic inside a command is caught and reported
//! the same way.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use shared_types::{Address, RpcMethod, RpcRequest, RpcResponse};
use tracing::{debug, error, instrument, warn};

use crate::commands::{Command, CommandError, CommandFactory};
use crate::domain::messages;
use crate::middleware::{GatewayMetrics, RequestTimer};

/// A request that is not a request at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("null request")]
    NullRequest,
}

/// Response plus what changed, for post-write fan-out.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub response: RpcResponse<Value>,
    /// Tables whose visible state may differ after this call.
    pub touched_tables: Vec<Address>,
    /// Whether the mempool may differ after this call.
    pub mempool_changed: bool,
}

impl Dispatched {
    fn answer(response: RpcResponse<Value>) -> Self {
        Self {
            response,
            touched_tables: Vec::new(),
            mempool_changed: false,
        }
    }

    fn failure(id: &str, message: &str) -> Self {
        Self::answer(RpcResponse::failure(id, message))
    }
}

pub struct CommandDispatcher {
    factory: CommandFactory,
    metrics: Arc<GatewayMetrics>,
}

impl CommandDispatcher {
    pub fn new(factory: CommandFactory, metrics: Arc<GatewayMetrics>) -> Self {
        Self { factory, metrics }
    }

    pub fn factory(&self) -> &CommandFactory {
        &self.factory
    }

    /// Dispatch one request. Only an absent request is an `Err`; every
    /// other outcome is a well-formed response.
    pub async fn dispatch(&self, request: Option<RpcRequest>) -> Result<Dispatched, DispatchError> {
        let request = request.ok_or(DispatchError::NullRequest)?;
        let mut timer = RequestTimer::new(self.metrics.clone());
        let dispatched = self.route(&request, &mut timer).await;
        timer.finish(!dispatched.response.is_error());
        Ok(dispatched)
    }

    #[instrument(skip(self, request, timer), fields(id = %request.id, method = ?request.method))]
    async fn route(&self, request: &RpcRequest, timer: &mut RequestTimer) -> Dispatched {
        let id = request.id.as_str();
        let name = match request.method.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Dispatched::failure(id, messages::MISSING_METHOD),
        };
        let method: RpcMethod = match name.parse() {
            Ok(method) => method,
            Err(_) => {
                debug!(method = %name, "Unknown method");
                return Dispatched::failure(id, messages::METHOD_NOT_FOUND);
            }
        };
        timer.set_category(method.category());

        let command = match self.factory.build(method, request) {
            Ok(command) => command,
            Err(e) => {
                debug!(method = %method, error = %e, "Rejected params");
                return Dispatched::failure(id, messages::INVALID_PARAMS);
            }
        };

        self.execute_guarded(id, method, command).await
    }

    /// [`Self::execute`] with panics turned into `"Operation failed"`.
    async fn execute_guarded(&self, id: &str, method: RpcMethod, command: Command) -> Dispatched {
        match AssertUnwindSafe(self.execute(id, method, command))
            .catch_unwind()
            .await
        {
            Ok(dispatched) => dispatched,
            Err(_) => {
                error!(method = %method, "Command panicked");
                Dispatched::failure(id, messages::OPERATION_FAILED)
            }
        }
    }

    async fn execute(&self, id: &str, method: RpcMethod, command: Command) -> Dispatched {
        match command {
            Command::Read(cmd) => match cmd.execute().await {
                Ok(signed) => Dispatched::answer(success(id, method, &signed)),
                Err(e) => fault(id, method, e),
            },
            Command::Write(cmd) => match cmd.execute().await {
                Ok(outcome) => Dispatched {
                    response: success(id, method, &outcome.result),
                    touched_tables: outcome.touched_tables,
                    mempool_changed: true,
                },
                Err(e) => fault(id, method, e),
            },
            Command::Control(cmd) => match cmd.execute().await {
                Ok(value) => Dispatched {
                    response: RpcResponse::success(id, value),
                    touched_tables: Vec::new(),
                    mempool_changed: matches!(method, RpcMethod::Purge | RpcMethod::ResetBlockchain),
                },
                Err(CommandError::Unauthorized) => {
                    warn!(method = %method, "Unauthorized control command");
                    Dispatched::failure(id, messages::UNAUTHORIZED)
                }
                Err(CommandError::InvalidParams(reason)) => {
                    debug!(method = %method, reason = %reason, "Rejected params");
                    Dispatched::failure(id, messages::INVALID_PARAMS)
                }
                Err(e) => fault(id, method, e),
            },
        }
    }
}

/// Project `result` to JSON for the response body.
fn success<T: Serialize>(id: &str, method: RpcMethod, result: &T) -> RpcResponse<Value> {
    match serde_json::to_value(result) {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => {
            error!(method = %method, error = %e, "Result projection failed");
            RpcResponse::failure(id, messages::OPERATION_FAILED)
        }
    }
}

/// Execution fault: full detail to the log, a generic message to the caller.
fn fault(id: &str, method: RpcMethod, e: CommandError) -> Dispatched {
    error!(method = %method, id = %id, error = %e, "Command failed");
    Dispatched::failure(id, messages::OPERATION_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::factory::tests::context;
    use crate::commands::{CommandContext, WriteCommand, WriteOutcome};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use shared_crypto::{verify, NoSignatureSigner, Secp256k1Signer, Signer};

    fn dispatcher_with(ctx: CommandContext) -> CommandDispatcher {
        CommandDispatcher::new(CommandFactory::new(ctx), Arc::new(GatewayMetrics::new()))
    }

    fn dispatcher() -> CommandDispatcher {
        dispatcher_with(context(Arc::new(NoSignatureSigner)))
    }

    async fn call(d: &CommandDispatcher, method: &str, params: Vec<Value>) -> RpcResponse<Value> {
        d.dispatch(Some(RpcRequest::new("7", method, params)))
            .await
            .unwrap()
            .response
    }

    #[tokio::test]
    async fn test_null_request_is_fatal() {
        assert_eq!(dispatcher().dispatch(None).await.unwrap_err(), DispatchError::NullRequest);
    }

    #[tokio::test]
    async fn test_missing_and_unknown_method() {
        let d = dispatcher();
        let missing = RpcRequest {
            method: None,
            ..RpcRequest::new("a", "", vec![])
        };
        let response = d.dispatch(Some(missing)).await.unwrap().response;
        assert_eq!(response.error(), Some(messages::MISSING_METHOD));
        assert_eq!(response.id, "a");

        let blank = call(&d, "   ", vec![]).await;
        assert_eq!(blank.error(), Some(messages::MISSING_METHOD));

        let unknown = call(&d, "eth_call", vec![]).await;
        assert_eq!(unknown.error(), Some(messages::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_get_mempool_upper_case_on_empty_pool() {
        let signer: Arc<dyn Signer> = Arc::new(Secp256k1Signer::ephemeral().unwrap());
        let d = dispatcher_with(context(signer.clone()));
        let response = d
            .dispatch(Some(RpcRequest::new("1", "GET_MEMPOOL", vec![])))
            .await
            .unwrap()
            .response;
        assert_eq!(response.id, "1");
        let result = response.result().unwrap();
        assert_eq!(result["data"], json!([]));
        let signature = result["signature"].as_str().unwrap();
        assert!(verify(&signer.public_key().unwrap(), b"[]", signature));
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let d = dispatcher();
        let response = call(&d, "get_account", vec![]).await;
        assert_eq!(response.error(), Some(messages::INVALID_PARAMS));
        let response = call(&d, "get_block", vec![json!("-1")]).await;
        assert_eq!(response.error(), Some(messages::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_execution_fault_is_generic() {
        let d = dispatcher();
        // No funds: the command fails during execution, not construction.
        let response = call(
            &d,
            "transfer",
            vec![
                json!("0x1111111111111111111111111111111111111111"),
                json!("0x2222222222222222222222222222222222222222"),
                json!("10"),
            ],
        )
        .await;
        assert_eq!(response.error(), Some(messages::OPERATION_FAILED));
    }

    #[tokio::test]
    async fn test_control_credentials() {
        let d = dispatcher();
        let denied = call(&d, "purge", vec![json!("admin"), json!("wrong")]).await;
        assert_eq!(denied.error(), Some(messages::UNAUTHORIZED));

        let dispatched = d
            .dispatch(Some(RpcRequest::new("p", "purge", vec![json!("admin"), json!("s3cret")])))
            .await
            .unwrap();
        assert_eq!(dispatched.response.result(), Some(&json!(true)));
        assert!(dispatched.mempool_changed);

        let stop = call(&d, "stop", vec![]).await;
        assert_eq!(stop.result(), Some(&json!(true)));
        assert!(!d.factory().context().lifecycle.is_producing());
    }

    struct Panicking;

    #[async_trait]
    impl WriteCommand for Panicking {
        async fn execute(&self) -> Result<WriteOutcome, CommandError> {
            panic!("engine bug")
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_operation_failed() {
        let d = dispatcher();
        let dispatched = d
            .execute_guarded("x", RpcMethod::Mine, Command::Write(Box::new(Panicking)))
            .await;
        assert_eq!(dispatched.response.id, "x");
        assert_eq!(dispatched.response.error(), Some(messages::OPERATION_FAILED));
        assert!(!dispatched.mempool_changed);
    }

    #[tokio::test]
    async fn test_every_method_is_routed() {
        let d = dispatcher();
        for method in RpcMethod::ALL {
            let response = call(&d, &method.as_str().to_uppercase(), vec![]).await;
            assert_ne!(response.error(), Some(messages::METHOD_NOT_FOUND), "{method}");
            assert_ne!(response.error(), Some(messages::MISSING_METHOD), "{method}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_unknown_methods_are_not_found(name in "[a-z_]{1,24}") {
            prop_assume!(name.parse::<RpcMethod>().is_err());
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let response = rt.block_on(call(&dispatcher(), &name, vec![]));
            prop_assert_eq!(response.error(), Some(messages::METHOD_NOT_FOUND));
        }

        #[test]
        fn prop_response_echoes_id_with_one_outcome(
            id in ".{0,16}",
            method in prop::sample::select(vec!["get_mempool", "get_block_height", "nope", "", "transfer", "stop"]),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let response = rt
                .block_on(dispatcher().dispatch(Some(RpcRequest::new(id.clone(), method, vec![]))))
                .unwrap()
                .response;
            prop_assert_eq!(&response.id, &id);
            prop_assert!(response.result().is_some() != response.error().is_some());
        }
    }
}
