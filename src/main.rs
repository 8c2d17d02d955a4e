use action_dispatch::utils::error::ErrorSeverity;
use action_dispatch::utils::{logger, validation::Validate};
use action_dispatch::{
    ActionRegistry, ActionRequest, CliConfig, DispatchConfig, Dispatcher, Identity,
    IdentitySource, LambdaInvoker, MemoryCache, SigV4Signer, Transport,
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting action-dispatch CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 載入並驗證設定
    let loaded = DispatchConfig::from_env().and_then(|config| {
        config.validate()?;
        let registry = ActionRegistry::from_file(&cli.registry)?;
        registry.validate()?;
        registry.check_resolvable(&config)?;
        Ok((config, registry))
    });
    let (config, registry) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if cli.list {
        for name in registry.names() {
            if let Some(action) = registry.get(name) {
                println!("{}\t{}", name, action.resolved_transport());
            }
        }
        return Ok(());
    }

    let action = cli
        .action
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--action is required"))?;
    let params: serde_json::Value = serde_json::from_str(&cli.params)
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;

    // 只有在需要時才載入簽章憑證
    let needs_signer = registry
        .actions
        .iter()
        .any(|definition| definition.name == action && definition.resolved_transport() == Transport::Gateway);

    let invoker = LambdaInvoker::from_config(&config).await;
    let mut dispatcher = Dispatcher::new(registry, config.clone(), invoker, MemoryCache::new());
    if needs_signer {
        let signer = SigV4Signer::from_env(&config.region).await?;
        dispatcher = dispatcher.with_signer(Arc::new(signer));
    }

    let identity = cli
        .identity
        .as_deref()
        .map(|id| Identity::new(id, IdentitySource::ClientContext));
    let request = ActionRequest::new(action, params)
        .with_identity(identity)
        .bypass_cache(cli.no_cache);

    match dispatcher.dispatch(request).await {
        Ok(response) => {
            tracing::info!("✅ Action completed with status {}", response.status);
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
        Err(e) => {
            tracing::error!(
                "❌ Dispatch failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            // 依錯誤嚴重程度決定結束碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 4,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code);
        }
    }

    Ok(())
}
