pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{LambdaInvoker, MemoryCache, NoCache, SigV4Signer};
pub use app::{ActionContext, ActionHandler, Entrypoint, InvocationContext, RouterHandler};
pub use config::{ActionRegistry, DispatchConfig};
pub use core::dispatcher::Dispatcher;
pub use domain::model::{ActionRequest, ActionResponse, Identity, IdentitySource, Transport};
pub use utils::error::{DispatchError, Result};
