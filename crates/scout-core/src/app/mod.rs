pub mod conversation;
pub mod dispatch;
pub mod orchestrator;
pub mod store;
pub mod tools;

pub use conversation::{Conversation, ConversationId, Message, Role};
pub use dispatch::{DispatchOutcome, ToolDispatcher};
pub use orchestrator::{ChatResponse, DEFAULT_SYSTEM_PROMPT, ToolOrchestrator};
pub use store::{ConversationStats, ConversationStore};
pub use tools::{SEARCH_ALL_TOOL, SearchTool};
