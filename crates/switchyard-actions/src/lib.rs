pub mod builtin;
pub mod cache;
pub mod registry;
pub mod template;

pub use builtin::BuiltinAction;
pub use cache::EmbeddingCache;
pub use registry::{ActionRegistry, ActionServices};
pub use template::MiniJinjaRenderer;
