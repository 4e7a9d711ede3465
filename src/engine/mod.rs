//! Subprocess streaming engine for the agent CLI.

pub mod codec;
pub mod command;
pub mod event;
pub mod oneshot;
pub mod stream;
pub mod timers;

use crate::config::EngineConfig;

pub use event::{Question, QuestionBatch, QuestionOption, StreamEvent, ToolUse, QUESTION_TOOL};
pub use stream::{StreamCallbacks, StreamOutcome, StreamRequest};

/// Engine front: owns the subprocess settings, one instance serves all calls.
///
/// The engine itself is stateless between calls; per-conversation state lives
/// in [`crate::store`]. Callers are expected to serialize calls per
/// conversation key externally.
#[derive(Debug, Clone)]
pub struct Engine {
    /// Subprocess settings shared by every call.
    pub(crate) config: EngineConfig,
}

impl Engine {
    /// Create an engine over the given subprocess settings.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The settings this engine spawns subprocesses with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
