use crate::domain::model::ActionResponse;
use crate::utils::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const CACHE_FORMAT_VERSION: u32 = 1;

/// 快取中的回應格式
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedEnvelope {
    v: u32,
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Value,
    cached_at: DateTime<Utc>,
}

pub fn encode_response(response: &ActionResponse) -> Result<String> {
    let envelope = CachedEnvelope {
        v: CACHE_FORMAT_VERSION,
        status: response.status,
        headers: response.headers.clone(),
        body: response.body.clone(),
        cached_at: Utc::now(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode_response(raw: &str) -> Result<ActionResponse> {
    let envelope: CachedEnvelope = serde_json::from_str(raw)?;
    if envelope.v != CACHE_FORMAT_VERSION {
        return Err(DispatchError::CacheError {
            message: format!("Unsupported cache entry version {}", envelope.v),
        });
    }

    tracing::debug!("💾 Cache entry written at {}", envelope.cached_at);

    Ok(ActionResponse {
        status: envelope.status,
        headers: envelope.headers,
        body: envelope.body,
        from_cache: true,
    })
}

/// 產生結構化錯誤：`{"error": {"type", "message", "statusCode", "details"?, "requestId"?}}`
///
/// 5xx 錯誤只回傳通用訊息，實際內容留在日誌中。
pub fn error_envelope(err: &DispatchError, request_id: Option<&str>) -> Value {
    let status = err.status_code();
    let message = if status >= 500 {
        "Internal server error".to_string()
    } else {
        err.user_friendly_message()
    };

    let mut error = json!({
        "type": err.kind(),
        "message": message,
        "statusCode": status,
    });

    if let DispatchError::ValidationError { details, .. } = err {
        if !details.is_empty() {
            error["details"] = json!(details);
        }
    }
    if let Some(request_id) = request_id {
        error["requestId"] = json!(request_id);
    }

    json!({ "error": error })
}

/// 辨識遠端回傳的結構化錯誤；必須同時有字串 `type` 與 `message`
pub fn error_from_envelope(body: &Value) -> Option<DispatchError> {
    let error = body.get("error")?.as_object()?;
    let kind = error.get("type")?.as_str()?;
    let message = error.get("message")?.as_str()?;
    let status = error
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (400..600).contains(s))
        .unwrap_or(500);

    Some(DispatchError::RemoteError {
        status,
        kind: kind.to_string(),
        message: message.to_string(),
    })
}
