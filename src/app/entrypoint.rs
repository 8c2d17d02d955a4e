use crate::app::identity::extract_identity;
use crate::app::schema::SchemaValidator;
use crate::core::codec::error_envelope;
use crate::domain::model::Identity;
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;

/// 使用者實作的 action 處理器
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, input: Value, ctx: &ActionContext) -> Result<Value>;
}

/// 傳給 handler 的情境
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub request_id: String,
    pub function_arn: String,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, Default)]
pub struct CognitoIdentity {
    pub identity_id: String,
    pub identity_pool_id: String,
}

/// 與執行環境無關的呼叫情境
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub request_id: String,
    pub function_arn: String,
    pub deadline_ms: u64,
    pub cognito_identity: Option<CognitoIdentity>,
    pub client_custom: HashMap<String, String>,
}

#[cfg(feature = "lambda")]
impl From<lambda_runtime::Context> for InvocationContext {
    fn from(ctx: lambda_runtime::Context) -> Self {
        Self {
            request_id: ctx.request_id,
            function_arn: ctx.invoked_function_arn,
            deadline_ms: ctx.deadline,
            cognito_identity: ctx.identity.map(|identity| CognitoIdentity {
                identity_id: identity.identity_id,
                identity_pool_id: identity.identity_pool_id,
            }),
            client_custom: ctx
                .client_context
                .map(|client| client.custom)
                .unwrap_or_default(),
        }
    }
}

/// 雲端函式入口：取得身分、驗證輸入、呼叫 handler，任何失敗都轉成結構化錯誤
pub struct Entrypoint<H: ActionHandler> {
    handler: H,
    schema: Option<SchemaValidator>,
    require_identity: bool,
}

impl<H: ActionHandler> Entrypoint<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            schema: None,
            require_identity: false,
        }
    }

    pub fn with_schema(mut self, schema: &Value) -> Result<Self> {
        self.schema = Some(SchemaValidator::new(schema)?);
        Ok(self)
    }

    pub fn require_identity(mut self, required: bool) -> Self {
        self.require_identity = required;
        self
    }

    /// 不會失敗：錯誤會以 `{"error": {...}}`（或 proxy 回應）回傳
    pub async fn invoke(&self, event: Value, invocation: InvocationContext) -> Value {
        let proxy = is_proxy_event(&event);
        let request_id = (!invocation.request_id.is_empty()).then_some(invocation.request_id.as_str());

        match self.process(&event, &invocation).await {
            Ok(output) => {
                tracing::debug!("✅ Invocation {} completed", invocation.request_id);
                if proxy {
                    proxy_response(200, &output)
                } else {
                    output
                }
            }
            Err(err) => {
                let status = err.status_code();
                if status >= 500 {
                    tracing::error!(
                        "❌ Invocation {} failed: {} (Category: {:?})",
                        invocation.request_id,
                        err,
                        err.category()
                    );
                } else {
                    tracing::warn!(
                        "⚠️ Invocation {} rejected: {}",
                        invocation.request_id,
                        err
                    );
                }

                let envelope = error_envelope(&err, request_id);
                if proxy {
                    proxy_response(status, &envelope)
                } else {
                    envelope
                }
            }
        }
    }

    async fn process(&self, event: &Value, invocation: &InvocationContext) -> Result<Value> {
        let input = if is_proxy_event(event) {
            proxy_input(event)?
        } else {
            event.clone()
        };

        let identity = extract_identity(event, invocation);
        match &identity {
            Some(identity) => {
                tracing::debug!("🪪 Caller {} ({:?})", identity.id, identity.source)
            }
            None if self.require_identity => {
                return Err(DispatchError::Unauthorized {
                    message: "A caller identity is required".to_string(),
                });
            }
            None => tracing::debug!("🪪 Anonymous caller"),
        }

        if let Some(schema) = &self.schema {
            schema.validate(&input)?;
        }

        let ctx = ActionContext {
            request_id: invocation.request_id.clone(),
            function_arn: invocation.function_arn.clone(),
            identity,
        };

        self.handler.handle(input, &ctx).await
    }

    #[cfg(feature = "lambda")]
    pub async fn run(
        &self,
        event: lambda_runtime::LambdaEvent<Value>,
    ) -> std::result::Result<Value, lambda_runtime::Error> {
        let (payload, context) = event.into_parts();
        Ok(self.invoke(payload, context.into()).await)
    }
}

/// API Gateway proxy 事件（REST 或 HTTP API）
pub fn is_proxy_event(event: &Value) -> bool {
    event.get("requestContext").is_some()
        && (event.get("httpMethod").is_some() || event.get("routeKey").is_some())
}

fn proxy_input(event: &Value) -> Result<Value> {
    let raw = match event.get("body") {
        None | Some(Value::Null) => return Ok(Value::Null),
        Some(Value::String(body)) => body,
        Some(other) => return Ok(other.clone()),
    };

    let is_base64 = event
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let text = if is_base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.as_bytes())
            .map_err(|e| DispatchError::validation(format!("Request body is not valid base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|_| DispatchError::validation("Request body is not valid UTF-8"))?
    } else {
        raw.clone()
    };

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text)
        .map_err(|e| DispatchError::validation(format!("Request body is not valid JSON: {}", e)))
}

fn proxy_response(status: u16, body: &Value) -> Value {
    json!({
        "statusCode": status,
        "headers": {"Content-Type": "application/json"},
        "body": body.to_string(),
        "isBase64Encoded": false,
    })
}
