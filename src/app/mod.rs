// Application layer: the cloud-function entrypoint wrapper and the router handler built on it.

pub mod entrypoint;
pub mod identity;
pub mod router;
pub mod schema;

pub use entrypoint::{ActionContext, ActionHandler, Entrypoint, InvocationContext};
pub use router::RouterHandler;
