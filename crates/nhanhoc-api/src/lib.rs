pub mod completion;
pub mod handlers;
pub mod operations;
pub mod router;
pub mod types;

pub use completion::{CompletionClient, CompletionConfig, CompletionRequest, OpenAiCompletionClient};
pub use operations::{OperationSettings, builtin_registry};
pub use router::{AppState, api_router};
