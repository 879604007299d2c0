pub mod action;
pub mod ambiguity;
pub mod clarification;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod llm;
pub mod retry;
pub mod search;
pub mod sentiment;
pub mod types;

// Re-export primary types for convenience
pub use action::{ParsedReply, SearchActionParams};
pub use ambiguity::{AmbiguityCategory, AmbiguityDetection};
pub use clarification::{ClarificationOption, ClarificationQuestion};
pub use config::EngineConfig;
pub use engine::{ConversationState, Engine, TurnOutcome};
pub use error::{EngineError, Result};
pub use intent::{IntentClassifier, IntentResult, QueryIntent};
pub use llm::{HttpLlmClient, LlmClient};
pub use retry::RetryStrategy;
pub use search::{SearchBackend, SearchClient};
pub use sentiment::{SentimentOrchestrator, SpeakerSentimentMap};
pub use types::{ChatMessage, ResultSegment, Role, SearchResponse};
