#[cfg(feature = "cli")]
pub mod cli;
pub mod env;
pub mod registry;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use env::DispatchConfig;
pub use registry::{ActionDefinition, ActionRegistry, ResolvedAction};
