use crate::config::env::DispatchConfig;
use crate::core::http::RetryPolicy;
use crate::domain::model::Transport;
use crate::utils::error::{DispatchError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Action 登錄表（TOML）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRegistry {
    #[serde(default)]
    pub defaults: ActionDefaults,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// 覆寫環境設定的預設值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDefaults {
    pub gateway_base_url: Option<String>,
    pub function_prefix: Option<String>,
    pub method: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub cache_ttl_seconds: Option<u64>,
    pub cache_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub transport: Option<Transport>,
    pub function_name: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub cache_ttl_seconds: Option<u64>,
    pub vary_by_identity: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

impl ActionDefinition {
    /// 明確指定的 transport 優先，其次 url → external、path → gateway，否則為 function
    pub fn resolved_transport(&self) -> Transport {
        if let Some(transport) = self.transport {
            return transport;
        }
        if self.url.is_some() {
            Transport::External
        } else if self.path.is_some() {
            Transport::Gateway
        } else {
            Transport::Function
        }
    }
}

/// 合併登錄表與環境設定後、可直接執行的 action
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub name: String,
    pub transport: Transport,
    /// function 名稱，或 gateway / external 的 URL 樣板
    pub target: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub cache_ttl: Duration,
    pub cache_prefix: String,
    pub vary_by_identity: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ResolvedAction {
    pub fn cache_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }
}

impl ActionRegistry {
    /// 從 TOML 檔案載入登錄表
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DispatchError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析登錄表
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DispatchError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GATEWAY_URL})，找不到時保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| DispatchError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.name.as_str()).collect()
    }

    /// 依名稱解析 action，套用 action → 登錄表預設 → 環境設定的優先順序
    pub fn resolve(&self, name: &str, config: &DispatchConfig) -> Result<ResolvedAction> {
        let action = self.get(name).ok_or_else(|| DispatchError::UnknownAction {
            action: name.to_string(),
        })?;
        let defaults = &self.defaults;
        let transport = action.resolved_transport();

        let target = match transport {
            Transport::Function => match &action.function_name {
                Some(function_name) => function_name.clone(),
                None => {
                    let prefix = defaults
                        .function_prefix
                        .as_deref()
                        .unwrap_or(&config.function_prefix);
                    format!("{}{}", prefix, action.name)
                }
            },
            Transport::Gateway => {
                let base = defaults
                    .gateway_base_url
                    .as_deref()
                    .or(config.gateway_base_url.as_deref())
                    .ok_or_else(|| DispatchError::MissingConfigError {
                        field: "gateway_base_url".to_string(),
                    })?;
                let path = action.path.as_deref().unwrap_or("/");
                format!("{}{}", base.trim_end_matches('/'), path)
            }
            Transport::External => action
                .url
                .clone()
                .ok_or_else(|| DispatchError::MissingConfigError {
                    field: format!("actions.{}.url", action.name),
                })?,
        };

        let method = action
            .method
            .as_deref()
            .or(defaults.method.as_deref())
            .unwrap_or(if transport == Transport::Function { "POST" } else { "GET" })
            .to_ascii_uppercase();

        let cache_ttl_seconds = action
            .cache_ttl_seconds
            .or(defaults.cache_ttl_seconds)
            .unwrap_or(config.cache_ttl_seconds);
        let timeout_seconds = action
            .timeout_seconds
            .or(defaults.timeout_seconds)
            .unwrap_or(config.timeout_seconds);

        Ok(ResolvedAction {
            name: action.name.clone(),
            transport,
            target,
            method,
            headers: action.headers.clone().unwrap_or_default(),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            cache_prefix: defaults
                .cache_prefix
                .clone()
                .unwrap_or_else(|| config.cache_prefix.clone()),
            vary_by_identity: action.vary_by_identity.unwrap_or(false),
            timeout: Duration::from_secs(timeout_seconds),
            retry: RetryPolicy {
                max_retries: defaults.max_retries.unwrap_or(config.max_retries),
                base_delay: Duration::from_millis(
                    defaults.retry_delay_ms.unwrap_or(config.retry_delay_ms),
                ),
            },
        })
    }

    /// 啟動時檢查每個 action 都能以目前設定解析
    pub fn check_resolvable(&self, config: &DispatchConfig) -> Result<()> {
        for action in &self.actions {
            let resolved = self.resolve(&action.name, config)?;
            if resolved.transport == Transport::Function {
                crate::utils::validation::validate_function_name(
                    &format!("actions.{}.function_name", action.name),
                    &resolved.target,
                )?;
            }
        }
        Ok(())
    }
}

impl Validate for ActionRegistry {
    fn validate(&self) -> Result<()> {
        use crate::utils::validation::*;

        if let Some(url) = &self.defaults.gateway_base_url {
            validate_url("defaults.gateway_base_url", url)?;
        }
        if let Some(method) = &self.defaults.method {
            validate_method("defaults.method", method)?;
        }
        if let Some(timeout) = self.defaults.timeout_seconds {
            validate_range("defaults.timeout_seconds", timeout, 1, 900)?;
        }
        if let Some(ttl) = self.defaults.cache_ttl_seconds {
            validate_range("defaults.cache_ttl_seconds", ttl, 0, MAX_CACHE_TTL_SECONDS)?;
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            validate_non_empty_string("actions.name", &action.name)?;
            if !seen.insert(action.name.as_str()) {
                return Err(DispatchError::InvalidConfigValueError {
                    field: "actions.name".to_string(),
                    value: action.name.clone(),
                    reason: "Duplicate action name".to_string(),
                });
            }

            let field = |suffix: &str| format!("actions.{}.{}", action.name, suffix);

            if let Some(method) = &action.method {
                validate_method(&field("method"), method)?;
            }
            if let Some(timeout) = action.timeout_seconds {
                validate_range(&field("timeout_seconds"), timeout, 1, 900)?;
            }
            if let Some(ttl) = action.cache_ttl_seconds {
                validate_range(&field("cache_ttl_seconds"), ttl, 0, MAX_CACHE_TTL_SECONDS)?;
            }

            match action.resolved_transport() {
                Transport::Function => {
                    if let Some(function_name) = &action.function_name {
                        validate_function_name(&field("function_name"), function_name)?;
                    }
                }
                Transport::Gateway => {
                    let path = validate_required_field(&field("path"), &action.path)?;
                    if !path.starts_with('/') {
                        return Err(DispatchError::InvalidConfigValueError {
                            field: field("path"),
                            value: path.clone(),
                            reason: "Gateway path must start with '/'".to_string(),
                        });
                    }
                }
                Transport::External => {
                    let url = validate_required_field(&field("url"), &action.url)?;
                    // 樣板參數不影響 URL 格式檢查
                    let sample = url.replace('{', "").replace('}', "");
                    validate_url(&field("url"), &sample)?;
                }
            }
        }

        tracing::debug!("✅ Action registry validation passed ({} actions)", self.actions.len());
        Ok(())
    }
}
