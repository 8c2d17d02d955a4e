use crate::config::{ActionRegistry, DispatchConfig, ResolvedAction};
use crate::core::cache_key::build_cache_key;
use crate::core::codec::{decode_response, encode_response, error_from_envelope};
use crate::core::http::{parse_body, HttpCall, HttpTransport};
use crate::domain::model::{ActionRequest, ActionResponse, FunctionOutput, Transport};
use crate::domain::ports::{FunctionInvoker, RequestSigner, ResponseCache};
use crate::utils::error::{DispatchError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 將 action 分派到 function / gateway / external，並處理快取
pub struct Dispatcher<I: FunctionInvoker, C: ResponseCache> {
    registry: ActionRegistry,
    config: DispatchConfig,
    invoker: I,
    cache: C,
    http: HttpTransport,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl<I: FunctionInvoker, C: ResponseCache> Dispatcher<I, C> {
    pub fn new(registry: ActionRegistry, config: DispatchConfig, invoker: I, cache: C) -> Self {
        Self {
            registry,
            config,
            invoker,
            cache,
            http: HttpTransport::new(),
            signer: None,
        }
    }

    /// gateway action 需要簽章器
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = HttpTransport::with_client(client);
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, request: ActionRequest) -> Result<ActionResponse> {
        let started = Instant::now();
        let action = self.registry.resolve(&request.action, &self.config)?;

        let cache_key = if action.cache_enabled() {
            let identity = if action.vary_by_identity {
                request.identity.as_ref().map(|identity| identity.id.as_str())
            } else {
                None
            };
            Some(build_cache_key(
                &action.cache_prefix,
                &action.name,
                &request.params,
                identity,
            ))
        } else {
            None
        };

        if let Some(key) = &cache_key {
            if request.bypass_cache {
                tracing::debug!("💾 {}: cache lookup bypassed", action.name);
            } else if let Some(hit) = self.lookup(key).await {
                tracing::info!("💾 {}: served from cache", action.name);
                return Ok(hit);
            }
        }

        tracing::debug!(
            "🚀 {}: dispatching via {} to {}",
            action.name,
            action.transport,
            action.target
        );

        let response = match action.transport {
            Transport::Function => self.invoke_function(&action, &request).await,
            Transport::Gateway => {
                let signer = self.signer.as_deref().ok_or_else(|| DispatchError::ConfigError {
                    message: format!(
                        "Action '{}' targets the API gateway but no request signer is configured",
                        action.name
                    ),
                })?;
                self.send_http(&action, &request, Some(signer)).await
            }
            Transport::External => self.send_http(&action, &request, None).await,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("❌ {}: {} ({:?})", action.name, e, started.elapsed());
                return Err(e);
            }
        };

        tracing::info!(
            "✅ {}: {} in {:?}",
            action.name,
            response.status,
            started.elapsed()
        );

        if let Some(key) = &cache_key {
            if response.is_success() {
                self.store(key, &response, action.cache_ttl).await;
            }
        }

        Ok(response)
    }

    /// 快取讀取失敗或內容無法解析時視為未命中
    async fn lookup(&self, key: &str) -> Option<ActionResponse> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match decode_response(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!("⚠️ Ignoring unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("⚠️ Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &ActionResponse, ttl: Duration) {
        let encoded = match encode_response(response) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("⚠️ Could not serialize response for cache: {}", e);
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &encoded, ttl).await {
            tracing::warn!("⚠️ Cache write failed for {}: {}", key, e);
        }
    }

    async fn invoke_function(
        &self,
        action: &ResolvedAction,
        request: &ActionRequest,
    ) -> Result<ActionResponse> {
        let payload = serde_json::to_vec(&request.params)?;
        let output = self
            .invoker
            .invoke(&action.target, &payload, request.identity.as_ref())
            .await?;
        interpret_function_output(&action.target, output)
    }

    async fn send_http(
        &self,
        action: &ResolvedAction,
        request: &ActionRequest,
        signer: Option<&dyn RequestSigner>,
    ) -> Result<ActionResponse> {
        let call = HttpCall::build(
            &action.method,
            &action.target,
            &request.params,
            &action.headers,
            action.timeout,
        )?;
        self.http.execute(&call, action.retry, signer).await
    }
}

/// 解讀函式回傳內容：函式錯誤、結構化錯誤、proxy 格式回應或一般 JSON
pub fn interpret_function_output(function: &str, output: FunctionOutput) -> Result<ActionResponse> {
    let text = String::from_utf8_lossy(&output.payload).into_owned();
    let body = parse_body(text);

    if let Some(hint) = output.function_error {
        let kind = body
            .get("errorType")
            .and_then(Value::as_str)
            .unwrap_or(hint.as_str())
            .to_string();
        let message = body
            .get("errorMessage")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match &body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        return Err(DispatchError::FunctionError {
            function: function.to_string(),
            kind,
            message,
        });
    }

    if let Some(err) = error_from_envelope(&body) {
        return Err(err);
    }

    if let Some(status) = proxy_status(&body) {
        let headers: BTreeMap<String, String> = body
            .get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let inner = match body.get("body") {
            Some(Value::String(s)) => parse_body(s.clone()),
            Some(other) => other.clone(),
            None => Value::Null,
        };

        if !(200..300).contains(&status) {
            if let Some(err) = error_from_envelope(&inner) {
                return Err(err);
            }
            return Err(DispatchError::RemoteError {
                status,
                kind: "RemoteError".to_string(),
                message: match &inner {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            });
        }

        return Ok(ActionResponse {
            status,
            headers,
            body: inner,
            from_cache: false,
        });
    }

    Ok(ActionResponse::ok(body))
}

fn proxy_status(body: &Value) -> Option<u16> {
    let object = body.as_object()?;
    if !object.contains_key("body") {
        return None;
    }
    object
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
}
