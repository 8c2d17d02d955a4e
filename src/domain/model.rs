use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Action 的傳輸方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// 直接呼叫雲端函式
    Function,
    /// 經簽章的 API Gateway 端點
    Gateway,
    /// 任意外部 HTTP 端點
    External,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transport::Function => "function",
            Transport::Gateway => "gateway",
            Transport::External => "external",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentitySource {
    CognitoContext,
    ClientContext,
    Authorizer,
    GatewayIdentity,
}

/// 呼叫者身分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    pub source: IdentitySource,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            id: id.into(),
            pool_id: None,
            source,
            claims: Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub params: Value,
    pub identity: Option<Identity>,
    /// 跳過快取讀取，但仍會以新結果更新快取
    pub bypass_cache: bool,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            identity: None,
            bypass_cache: false,
        }
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    #[serde(skip)]
    pub from_cache: bool,
}

impl ActionResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body,
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 函式呼叫的原始結果
#[derive(Debug, Clone, Default)]
pub struct FunctionOutput {
    pub status_code: i32,
    pub function_error: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}
