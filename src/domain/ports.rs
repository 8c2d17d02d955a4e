use crate::domain::model::{FunctionOutput, Identity};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait FunctionInvoker: Send + Sync {
    fn invoke(
        &self,
        function_name: &str,
        payload: &[u8],
        identity: Option<&Identity>,
    ) -> impl std::future::Future<Output = Result<FunctionOutput>> + Send;
}

/// 外部注入的快取後端，值為已序列化的回應
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<()>;
}
