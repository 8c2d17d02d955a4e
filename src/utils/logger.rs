use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 專用的過濾設定變數，優先於 `RUST_LOG`
pub const LOG_ENV: &str = "DISPATCH_LOG";

fn dispatch_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// 輸出到 stderr，stdout 保留給 action 回應
pub fn init_cli_logger(verbose: bool) {
    let default_directive = if verbose {
        // 同時顯示 AWS SDK 的重試紀錄
        "action_dispatch=debug,aws_smithy_runtime=debug,info"
    } else {
        "action_dispatch=info,warn"
    };

    tracing_subscriber::registry()
        .with(dispatch_filter(default_directive))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

/// CloudWatch 已附上時間戳記，JSON 事件欄位攤平以便查詢
pub fn init_lambda_logger() {
    tracing_subscriber::registry()
        .with(dispatch_filter("action_dispatch=info,warn"))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(false)
                .without_time(),
        )
        .init();
}
