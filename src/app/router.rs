use crate::app::entrypoint::{ActionContext, ActionHandler};
use crate::core::dispatcher::Dispatcher;
use crate::domain::model::ActionRequest;
use crate::domain::ports::{FunctionInvoker, ResponseCache};
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// router 函式的輸入 schema
pub const ROUTER_INPUT_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["action"],
    "properties": {
        "action": {"type": "string", "minLength": 1},
        "params": {},
        "bypassCache": {"type": "boolean"}
    },
    "additionalProperties": false
}"#;

pub fn router_schema() -> Result<Value> {
    Ok(serde_json::from_str(ROUTER_INPUT_SCHEMA)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterInput {
    action: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    bypass_cache: bool,
}

/// 將 `{"action", "params"}` 轉交給 dispatcher，並帶上呼叫者身分
pub struct RouterHandler<I: FunctionInvoker, C: ResponseCache> {
    dispatcher: Arc<Dispatcher<I, C>>,
}

impl<I: FunctionInvoker, C: ResponseCache> RouterHandler<I, C> {
    pub fn new(dispatcher: Arc<Dispatcher<I, C>>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<I, C> ActionHandler for RouterHandler<I, C>
where
    I: FunctionInvoker + 'static,
    C: ResponseCache + 'static,
{
    async fn handle(&self, input: Value, ctx: &ActionContext) -> Result<Value> {
        let input: RouterInput = serde_json::from_value(input)
            .map_err(|e| DispatchError::validation(format!("Invalid router input: {}", e)))?;

        tracing::info!("🧭 Routing action {}", input.action);

        let request = ActionRequest::new(input.action, input.params)
            .with_identity(ctx.identity.clone())
            .bypass_cache(input.bypass_cache);
        let response = self.dispatcher.dispatch(request).await?;

        Ok(json!({
            "status": response.status,
            "body": response.body,
            "cached": response.from_cache,
        }))
    }
}
