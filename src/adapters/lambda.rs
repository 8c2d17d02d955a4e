use crate::config::DispatchConfig;
use crate::domain::model::{FunctionOutput, Identity};
use crate::domain::ports::FunctionInvoker;
use crate::utils::error::{DispatchError, Result};
use aws_config::BehaviorVersion;
use aws_sdk_lambda::config::retry::RetryConfig;
use aws_sdk_lambda::config::timeout::TimeoutConfig;
use aws_sdk_lambda::config::Region;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use base64::Engine;
use serde_json::json;
use std::time::Duration;

/// 以 RequestResponse 模式同步呼叫 Lambda 函式
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: LambdaClient,
}

impl LambdaInvoker {
    pub fn new(client: LambdaClient) -> Self {
        Self { client }
    }

    /// 重試與逾時交給 SDK 處理
    pub async fn from_config(config: &DispatchConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let lambda_config = aws_sdk_lambda::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_retries + 1))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_seconds))
                    .build(),
            )
            .build();

        Self::new(LambdaClient::from_conf(lambda_config))
    }
}

/// 將呼叫者身分放進 Lambda client context（base64 JSON）
pub fn client_context(identity: &Identity) -> Result<String> {
    let mut custom = serde_json::Map::new();
    custom.insert("identityId".to_string(), json!(identity.id));
    if let Some(pool_id) = &identity.pool_id {
        custom.insert("identityPoolId".to_string(), json!(pool_id));
    }

    let context = json!({
        "client": {
            "installationId": "",
            "appTitle": "",
            "appVersionName": "",
            "appVersionCode": "",
            "appPackageName": "",
        },
        "custom": custom,
        "env": {},
        "environment": {},
    });

    let encoded = serde_json::to_vec(&context)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(encoded))
}

impl FunctionInvoker for LambdaInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &[u8],
        identity: Option<&Identity>,
    ) -> Result<FunctionOutput> {
        let mut request = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload.to_vec()));

        if let Some(identity) = identity {
            request = request.client_context(client_context(identity)?);
        }

        tracing::debug!("📞 Invoking function {} ({} bytes)", function_name, payload.len());

        let output = request
            .send()
            .await
            .map_err(|e| DispatchError::InvokeError {
                function: function_name.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(FunctionOutput {
            status_code: output.status_code(),
            function_error: output.function_error().map(str::to_string),
            payload: output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        })
    }
}
