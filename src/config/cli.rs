use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "action-dispatch")]
#[command(about = "Dispatch a registered action to a function, gateway or HTTP endpoint")]
pub struct CliConfig {
    #[arg(long, default_value = "actions.toml", help = "Action registry (TOML)")]
    pub registry: PathBuf,

    #[arg(long, required_unless_present = "list", help = "Action name to dispatch")]
    pub action: Option<String>,

    #[arg(long, default_value = "{}", help = "Action parameters as JSON")]
    pub params: String,

    #[arg(long, help = "Caller identity id forwarded to the action")]
    pub identity: Option<String>,

    #[arg(long, help = "Skip the cache lookup (the entry is still refreshed)")]
    pub no_cache: bool,

    #[arg(long, help = "List registered actions and exit")]
    pub list: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}
