//! Agent module: transcript types, the turn executor and session management.

pub mod executor;
pub mod prompts;
pub mod session;
pub mod session_manager;
pub mod turn;

pub use executor::TurnExecutor;
pub use session::{ConversationSession, SessionPhase, SessionSnapshot, SessionState};
pub use session_manager::{AgentDeps, SessionManager};
pub use turn::{Role, ToolCall, ToolFailure, ToolFailureKind, ToolResult, Turn, TurnFailure};
