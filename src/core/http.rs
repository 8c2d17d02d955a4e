use crate::core::codec::error_from_envelope;
use crate::domain::model::ActionResponse;
use crate::domain::ports::RequestSigner;
use crate::utils::error::{DispatchError, Result};
use regex::Regex;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// `{name}` 佔位符，程序內只編譯一次
static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}"));

/// HTTP 重試策略：指數退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// `attempt` 從 0 開始
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// 已解析完成、可直接送出的 HTTP 呼叫
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpCall {
    /// 以樣板與參數組出請求：`{name}` 佔位符由參數取代，其餘參數依 method 放進 query 或 JSON body
    pub fn build(
        method: &str,
        url_template: &str,
        params: &Value,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            DispatchError::InvalidConfigValueError {
                field: "method".to_string(),
                value: method.to_string(),
                reason: "Invalid HTTP method".to_string(),
            }
        })?;

        let (rendered, used) = render_template(url_template, params)?;
        let mut url = Url::parse(&rendered).map_err(|e| DispatchError::ConfigError {
            message: format!("Invalid request URL {}: {}", rendered, e),
        })?;

        let mut body = None;
        if uses_query(&method) {
            let pairs = query_pairs(params, &used)?;
            if !pairs.is_empty() {
                let mut query = url.query_pairs_mut();
                for (key, value) in &pairs {
                    query.append_pair(key, value);
                }
            }
        } else {
            body = remaining_body(params, &used);
        }

        Ok(Self {
            method,
            url,
            headers: headers.clone(),
            body,
            timeout,
        })
    }
}

fn uses_query(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::DELETE
}

/// 取代樣板中的 `{name}`，回傳結果與已使用的參數名稱
pub fn render_template(template: &str, params: &Value) -> Result<(String, HashSet<String>)> {
    let re = PLACEHOLDER
        .as_ref()
        .map_err(|e| DispatchError::ConfigError {
            message: format!("Invalid placeholder pattern: {}", e),
        })?;

    let mut used = HashSet::new();
    let mut missing = Vec::new();

    let rendered = re
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match params.get(key) {
                Some(value) if !value.is_null() => {
                    used.insert(key.to_string());
                    encode_segment(&scalar_to_string(value))
                }
                _ => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    if !missing.is_empty() {
        return Err(DispatchError::validation(format!(
            "Missing path parameter(s): {}",
            missing.join(", ")
        )));
    }

    Ok((rendered, used))
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn query_pairs(params: &Value, used: &HashSet<String>) -> Result<Vec<(String, String)>> {
    match params {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter(|(key, value)| !used.contains(*key) && !value.is_null())
            .map(|(key, value)| (key.clone(), scalar_to_string(value)))
            .collect()),
        _ => Err(DispatchError::validation(
            "Parameters must be an object for query-string requests",
        )),
    }
}

fn remaining_body(params: &Value, used: &HashSet<String>) -> Option<Value> {
    match params {
        Value::Null => None,
        Value::Object(map) => {
            let rest: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !used.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Some(Value::Object(rest))
        }
        other => Some(other.clone()),
    }
}

/// 共用的 HTTP 傳輸（gateway 與 external 皆經此送出）
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn execute(
        &self,
        call: &HttpCall,
        retry: RetryPolicy,
        signer: Option<&dyn RequestSigner>,
    ) -> Result<ActionResponse> {
        let mut attempt = 0;

        loop {
            let mut request = self.build_request(call)?;
            // 每次嘗試都重新簽章，簽章內含時間戳
            if let Some(signer) = signer {
                signer.sign(&mut request).await?;
            }

            tracing::debug!("📡 {} {} (attempt {})", call.method, call.url, attempt + 1);

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < retry.max_retries {
                        tracing::warn!(
                            "🔁 {} {} returned {}, retrying",
                            call.method,
                            call.url,
                            status
                        );
                        tokio::time::sleep(retry.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return read_response(response, &call.url).await;
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < retry.max_retries => {
                    tracing::warn!("🔁 {} {} failed: {}, retrying", call.method, call.url, e);
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn build_request(&self, call: &HttpCall) -> Result<reqwest::Request> {
        let mut builder = self
            .client
            .request(call.method.clone(), call.url.clone())
            .timeout(call.timeout);

        for (key, value) in &call.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &call.body {
            builder = builder.json(body);
        }

        Ok(builder.build()?)
    }
}

async fn read_response(response: reqwest::Response, url: &Url) -> Result<ActionResponse> {
    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let text = response.text().await?;
    let body = parse_body(text);

    if !(200..300).contains(&status) {
        if let Some(err) = error_from_envelope(&body) {
            return Err(err);
        }
        let body_text = match &body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        return Err(DispatchError::HttpStatusError {
            status,
            url: url.to_string(),
            body: body_text,
        });
    }

    Ok(ActionResponse {
        status,
        headers,
        body,
        from_cache: false,
    })
}

/// JSON 可解析時回傳 JSON，否則包成字串；空內容為 null
pub fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}
