// Adapters layer: concrete implementations of the domain ports (AWS Lambda, SigV4 signing, caches).

pub mod lambda;
pub mod memory_cache;
pub mod sigv4;

pub use lambda::LambdaInvoker;
pub use memory_cache::{MemoryCache, NoCache};
pub use sigv4::SigV4Signer;
