use crate::utils::error::{DispatchError, Result};
use crate::utils::validation::Validate;
use std::env;
use std::str::FromStr;

/// 執行期設定（環境變數）
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub region: String,
    pub gateway_base_url: Option<String>,
    pub function_prefix: String,
    pub cache_prefix: String,
    pub cache_ttl_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            gateway_base_url: None,
            function_prefix: String::new(),
            cache_prefix: "action:".to_string(),
            cache_ttl_seconds: 0,
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 以任意查詢函式載入，方便測試時不必修改行程環境變數
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            region: lookup("AWS_REGION")
                .or_else(|| lookup("AWS_DEFAULT_REGION"))
                .unwrap_or(defaults.region),
            gateway_base_url: lookup("DISPATCH_GATEWAY_URL").filter(|v| !v.trim().is_empty()),
            function_prefix: lookup("DISPATCH_FUNCTION_PREFIX").unwrap_or(defaults.function_prefix),
            cache_prefix: lookup("DISPATCH_CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            cache_ttl_seconds: parse_var(&lookup, "DISPATCH_CACHE_TTL", defaults.cache_ttl_seconds)?,
            timeout_seconds: parse_var(&lookup, "DISPATCH_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
            max_retries: parse_var(&lookup, "DISPATCH_MAX_RETRIES", defaults.max_retries)?,
            retry_delay_ms: parse_var(&lookup, "DISPATCH_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| DispatchError::InvalidConfigValueError {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

impl Validate for DispatchConfig {
    fn validate(&self) -> Result<()> {
        use crate::utils::validation::*;

        validate_aws_region("region", &self.region)?;

        if let Some(url) = &self.gateway_base_url {
            validate_url("gateway_base_url", url)?;
        }

        validate_positive_number("timeout_seconds", self.timeout_seconds, 1)?;
        validate_range("timeout_seconds", self.timeout_seconds, 1, 900)?;
        validate_range("max_retries", self.max_retries, 0, 10)?;
        validate_range(
            "cache_ttl_seconds",
            self.cache_ttl_seconds,
            0,
            MAX_CACHE_TTL_SECONDS,
        )?;

        tracing::debug!("✅ Dispatch configuration validation passed");
        Ok(())
    }
}
