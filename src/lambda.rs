#[cfg(feature = "lambda")]
use action_dispatch::app::router::{router_schema, RouterHandler};
#[cfg(feature = "lambda")]
use action_dispatch::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use action_dispatch::{
    ActionRegistry, DispatchConfig, Dispatcher, Entrypoint, LambdaInvoker, MemoryCache,
    SigV4Signer,
};
#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use serde_json::Value;
#[cfg(feature = "lambda")]
use std::sync::Arc;

/// 登錄表來源：`DISPATCH_REGISTRY_TOML`（內嵌）優先，其次 `DISPATCH_REGISTRY` 檔案路徑
#[cfg(feature = "lambda")]
fn load_registry() -> action_dispatch::Result<ActionRegistry> {
    if let Ok(inline) = std::env::var("DISPATCH_REGISTRY_TOML") {
        return ActionRegistry::from_toml_str(&inline);
    }
    let path = std::env::var("DISPATCH_REGISTRY").unwrap_or_else(|_| "actions.toml".to_string());
    ActionRegistry::from_file(path)
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    let config = DispatchConfig::from_env()?;
    config.validate()?;
    let registry = load_registry()?;
    registry.validate()?;
    registry.check_resolvable(&config)?;

    tracing::info!(
        "Starting dispatch router with {} actions",
        registry.actions.len()
    );

    // 冷啟動時建立一次，之後的呼叫共用
    let invoker = LambdaInvoker::from_config(&config).await;
    let signer = SigV4Signer::from_env(&config.region).await?;
    let dispatcher = Dispatcher::new(registry, config, invoker, MemoryCache::new())
        .with_signer(Arc::new(signer));

    let require_identity = std::env::var("DISPATCH_REQUIRE_IDENTITY")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let entrypoint = Entrypoint::new(RouterHandler::new(Arc::new(dispatcher)))
        .with_schema(&router_schema()?)?
        .require_identity(require_identity);
    let entrypoint = &entrypoint;

    run(service_fn(move |event: LambdaEvent<Value>| async move {
        entrypoint.run(event).await
    }))
    .await
}

#[cfg(not(feature = "lambda"))]
fn main() {
    eprintln!("dispatch-lambda requires the `lambda` feature");
}
