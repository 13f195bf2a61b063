pub mod chat_handler;
pub mod classifier;
pub mod context_builder;

pub use chat_handler::{ChatOutcome, ChatService};
pub use classifier::{classify_files, ClassifiedFiles};
pub use context_builder::ContextBuilder;
