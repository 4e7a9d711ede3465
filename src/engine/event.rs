//! Stream event model for the agent CLI's NDJSON protocol.
//!
//! One stdout line is one JSON object. The discriminant lives in the `type`
//! field. An `assistant` line carries a content list that may mix text blocks
//! and nested `tool_use` blocks, so a single line can decode into several
//! [`StreamEvent`]s. Lines that are not valid JSON, or whose `type` is
//! unknown, decode to an empty event list — the protocol is tolerant of
//! partial or garbage lines at stream boundaries.

use serde::Deserialize;
use serde_json::Value;

/// Reserved tool name for the clarifying-question event.
///
/// A `tool_use` carrying this name is never forwarded as ordinary progress;
/// it pauses the stream until an externally supplied answer arrives.
pub const QUESTION_TOOL: &str = "AskUserQuestion";

/// Maximum number of questions accepted from a single question batch.
pub const MAX_QUESTIONS: usize = 4;

/// Character budget for progress snippets forwarded to callers.
pub const PROGRESS_SNIPPET_CHARS: usize = 120;

// ── Domain events ─────────────────────────────────────────────────────────────

/// One parsed protocol event, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Stream opened; carries the subprocess-assigned session identifier.
    Init {
        /// Session identifier to report upward exactly once per call.
        session_id: String,
    },
    /// Assistant prose; the last one seen is the fallback result text.
    AssistantText {
        /// Full text block as emitted by the subprocess.
        text: String,
    },
    /// Tool invocation, either nested in an assistant message or top-level.
    ToolUse(ToolUse),
    /// Final result text; the last one seen wins.
    ResultText {
        /// Result payload.
        text: String,
    },
}

/// A tool invocation reported by the subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    /// Correlation identifier echoed back in `tool_result` messages.
    pub id: String,
    /// Tool name; [`QUESTION_TOOL`] is reserved.
    pub name: String,
    /// Tool-specific input object.
    pub input: Value,
}

impl ToolUse {
    /// Whether this invocation is the reserved clarifying-question tool.
    #[must_use]
    pub fn is_question(&self) -> bool {
        self.name == QUESTION_TOOL
    }

    /// Extract the embedded question batch, if this is the reserved tool and
    /// its input parses. Batches are truncated to [`MAX_QUESTIONS`].
    #[must_use]
    pub fn question_batch(&self) -> Option<QuestionBatch> {
        if !self.is_question() {
            return None;
        }
        let input: QuestionInput = serde_json::from_value(self.input.clone()).ok()?;
        let mut questions = input.questions;
        questions.truncate(MAX_QUESTIONS);
        Some(QuestionBatch {
            tool_use_id: self.id.clone(),
            questions,
        })
    }
}

// ── Clarifying questions ──────────────────────────────────────────────────────

/// A batch of clarifying questions extracted from one reserved tool event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBatch {
    /// `tool_use` id to echo in the answer injection message.
    pub tool_use_id: String,
    /// Questions in presentation order, at most [`MAX_QUESTIONS`].
    pub questions: Vec<Question>,
}

/// One clarifying question with its selectable options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    /// Question text; also the key of the answer map.
    #[serde(rename = "question")]
    pub text: String,
    /// Short header shown above the question.
    #[serde(default)]
    pub header: String,
    /// Selectable answers.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Whether several options may be chosen at once.
    #[serde(rename = "multiSelect", default)]
    pub multi_select: bool,
}

/// One selectable answer for a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionOption {
    /// Option label; the value placed into the answer map when chosen.
    pub label: String,
    /// Longer explanation of the option.
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct QuestionInput {
    questions: Vec<Question>,
}

// ── Wire decoding ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: WireMessage,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Decode one NDJSON line into zero or more [`StreamEvent`]s.
///
/// Malformed JSON, unknown `type` values, and empty lines all return an
/// empty vector; per-line failures never abort the stream.
#[must_use]
pub fn parse_line(line: &str) -> Vec<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let Ok(wire) = serde_json::from_str::<WireEvent>(trimmed) else {
        return Vec::new();
    };

    match wire {
        WireEvent::System {
            subtype,
            session_id,
        } => match (subtype.as_deref(), session_id) {
            (Some("init"), Some(sid)) => vec![StreamEvent::Init { session_id: sid }],
            _ => Vec::new(),
        },
        WireEvent::Assistant { message } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } if !text.is_empty() => {
                    Some(StreamEvent::AssistantText { text })
                }
                WireBlock::ToolUse { id, name, input } => {
                    Some(StreamEvent::ToolUse(ToolUse { id, name, input }))
                }
                _ => None,
            })
            .collect(),
        WireEvent::ToolUse { id, name, input } => {
            vec![StreamEvent::ToolUse(ToolUse { id, name, input })]
        }
        WireEvent::Result { result } => result
            .map(|text| vec![StreamEvent::ResultText { text }])
            .unwrap_or_default(),
        WireEvent::Unknown => Vec::new(),
    }
}

// ── Wire encoding ─────────────────────────────────────────────────────────────

/// Build the first protocol message written to an interactive stream:
/// the user prompt wrapped in a `user` role envelope.
#[must_use]
pub fn user_message(prompt: &str) -> Value {
    serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": prompt },
    })
}

/// Build the answer injection message written after a question batch is
/// resolved externally.
#[must_use]
pub fn tool_result_message(
    tool_use_id: &str,
    answers: &std::collections::HashMap<String, String>,
) -> Value {
    serde_json::json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": { "answers": answers },
    })
}

// ── Progress formatting ───────────────────────────────────────────────────────

/// Truncate assistant text to a short progress snippet.
#[must_use]
pub fn progress_snippet(text: &str) -> String {
    let mut chars = text.chars();
    let snippet: String = chars.by_ref().take(PROGRESS_SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{snippet}…")
    } else {
        snippet
    }
}

/// Format a tool invocation into a one-line human-readable summary.
///
/// Tool-specific detail is pulled from the input object where the tool is
/// recognized; unrecognized tools fall back to the bare name.
#[must_use]
pub fn tool_summary(tool: &ToolUse) -> String {
    let field = |key: &str| tool.input.get(key).and_then(Value::as_str);

    let detail = match tool.name.as_str() {
        "Bash" => field("command"),
        "Read" | "Write" | "Edit" | "NotebookEdit" => field("file_path"),
        "Grep" | "Glob" => field("pattern"),
        "WebFetch" => field("url"),
        "WebSearch" => field("query"),
        "Task" => field("subagent_type").or_else(|| field("description")),
        _ => None,
    };

    match detail {
        Some(detail) => progress_snippet(&format!("{}: {detail}", tool.name)),
        None => tool.name.clone(),
    }
}
