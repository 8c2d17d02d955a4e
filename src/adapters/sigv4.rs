use crate::domain::ports::RequestSigner;
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_lambda::config::Region;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::SystemTime;

pub const EXECUTE_API_SERVICE: &str = "execute-api";

/// AWS SigV4 簽章器，用於 IAM 授權的 API Gateway 端點
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: SharedCredentialsProvider,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(
        credentials: SharedCredentialsProvider,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn execute_api(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self::new(credentials, region, EXECUTE_API_SERVICE)
    }

    /// 使用預設的 AWS 憑證鏈
    pub async fn from_env(region: &str) -> Result<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let credentials =
            sdk_config
                .credentials_provider()
                .ok_or_else(|| DispatchError::ConfigError {
                    message: "No AWS credentials provider available for request signing"
                        .to_string(),
                })?;

        Ok(Self::execute_api(credentials, region))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

fn signing_error(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::SigningError {
        message: e.to_string(),
    }
}

#[async_trait]
impl RequestSigner for SigV4Signer {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<()> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(signing_error)?;
        let identity: Identity = credentials.into();

        let signed_headers: Vec<(String, String)> = {
            let params: aws_sigv4::http_request::SigningParams<'_> = v4::SigningParams::builder()
                .identity(&identity)
                .region(&self.region)
                .name(&self.service)
                .time(SystemTime::now())
                .settings(SigningSettings::default())
                .build()
                .map_err(signing_error)?
                .into();

            let body = request
                .body()
                .and_then(|body| body.as_bytes())
                .unwrap_or(&[]);
            let headers = request
                .headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));

            let signable = SignableRequest::new(
                request.method().as_str(),
                request.url().as_str(),
                headers,
                SignableBody::Bytes(body),
            )
            .map_err(signing_error)?;

            let (instructions, _signature) = sign(signable, &params)
                .map_err(signing_error)?
                .into_parts();

            instructions
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        };

        for (name, value) in signed_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(signing_error)?;
            let value = HeaderValue::from_str(&value).map_err(signing_error)?;
            request.headers_mut().insert(name, value);
        }

        tracing::debug!("🔏 Signed {} {} for {}", request.method(), request.url(), self.service);
        Ok(())
    }
}
