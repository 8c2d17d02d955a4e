pub mod cache_key;
pub mod codec;
pub mod dispatcher;
pub mod http;

pub use crate::domain::model::{ActionRequest, ActionResponse, Transport};
pub use crate::domain::ports::{FunctionInvoker, RequestSigner, ResponseCache};
pub use crate::utils::error::Result;
