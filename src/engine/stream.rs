//! Streaming subprocess call.
//!
//! Spawns the agent CLI, reads its NDJSON event stream, and races three
//! things against normal protocol progress: external cancellation, the idle
//! window, and the soft ceiling. In interactive mode the stream additionally
//! pauses whenever the subprocess raises a clarifying question, awaits the
//! caller-supplied answer, injects it over stdin, and resumes.
//!
//! State machine per call:
//! `Idle → Spawned → Streaming ⇄ AwaitingAnswer → {Succeeded | Failed | Cancelled}`

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::process::{ChildStderr, ChildStdin};
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::engine::codec::NdjsonCodec;
use crate::engine::command::{build_command, InvocationMode};
use crate::engine::event::{
    self, progress_snippet, tool_summary, QuestionBatch, StreamEvent,
};
use crate::engine::timers::{CallTimers, TimerEvent};
use crate::engine::Engine;
use crate::{AppError, Result};

/// Cap on retained stderr: keep the most recent 8 KiB.
pub const STDERR_TAIL_BYTES: usize = 8192;

/// Exit codes treated as graceful termination rather than failure.
///
/// 130 is interrupt, 143 is the supervisor's terminate signal; both mean the
/// call was shut down on purpose and whatever text accumulated is returned.
pub const GRACEFUL_EXIT_CODES: &[i32] = &[130, 143];

/// Message handed to `on_soft_ceiling` when the ceiling fires.
pub const SOFT_CEILING_MESSAGE: &str =
    "call has been running past the soft ceiling; it will continue until cancelled or idle";

// ── Callbacks ─────────────────────────────────────────────────────────────────

/// Progress notification: short one-line snippets in event order.
pub type ProgressFn = Box<dyn Fn(&str) + Send + Sync>;

/// Session id report, fired at most once per call on the `init` event.
pub type SessionIdFn = Box<dyn Fn(&str) + Send + Sync>;

/// Soft-ceiling notification, fired at most once per call.
pub type SoftCeilingFn = Box<dyn Fn(&str) + Send + Sync>;

/// Clarifying-question resolver; returns a map from question text to the
/// chosen answer. Supplying this handler switches the call to interactive
/// mode. The future may take arbitrarily long — a human is on the other end.
pub type QuestionFn =
    Box<dyn Fn(QuestionBatch) -> BoxFuture<'static, HashMap<String, String>> + Send + Sync>;

/// Callbacks wired into one streaming call.
#[derive(Default)]
#[allow(clippy::struct_field_names)]
pub struct StreamCallbacks {
    /// Progress snippets (assistant text and tool summaries).
    pub on_progress: Option<ProgressFn>,
    /// Subprocess-assigned session id.
    pub on_session_id: Option<SessionIdFn>,
    /// Soft-ceiling warning.
    pub on_soft_ceiling: Option<SoftCeilingFn>,
    /// Clarifying-question resolver; presence selects interactive mode.
    pub on_question: Option<QuestionFn>,
}

// ── Request / outcome ─────────────────────────────────────────────────────────

/// Parameters for one streaming call.
#[derive(Debug)]
pub struct StreamRequest {
    /// User prompt.
    pub prompt: String,
    /// Previous subprocess session id to resume, if reliable.
    ///
    /// Interactive mode (an `on_question` handler supplied) always opens a
    /// fresh session; a resume id set there is ignored with a warning.
    pub resume: Option<String>,
    /// Per-call model override; falls back to the engine's configured model.
    pub model: Option<String>,
    /// Working directory the subprocess starts in.
    pub working_dir: std::path::PathBuf,
    /// External cancellation signal; may be raised before spawn.
    pub cancel: tokio_util::sync::CancellationToken,
}

/// Terminal product of one streaming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Last `result` event text, falling back to the last assistant text.
    pub text: String,
    /// Session id reported by the subprocess, if any arrived.
    pub session_id: Option<String>,
    /// True when the call was cut short by cancellation or a graceful
    /// termination signal; `text` holds whatever had accumulated.
    pub interrupted: bool,
}

impl Engine {
    /// Run one streaming call to completion.
    ///
    /// # Errors
    ///
    /// - [`AppError::Spawn`] — the binary could not be launched.
    /// - [`AppError::IdleTimeout`] — no stdout bytes within the idle window.
    /// - [`AppError::NonZeroExit`] — subprocess failure with stderr tail.
    /// - [`AppError::EmptyOutput`] — clean exit but nothing to return.
    /// - [`AppError::Io`] — pipe read/write failure mid-protocol.
    #[allow(clippy::too_many_lines)]
    pub async fn stream(
        &self,
        request: StreamRequest,
        callbacks: StreamCallbacks,
    ) -> Result<StreamOutcome> {
        // Pre-emptive cancellation: settle without spawning anything.
        if request.cancel.is_cancelled() {
            debug!("stream call cancelled before spawn");
            return Ok(StreamOutcome {
                text: String::new(),
                session_id: None,
                interrupted: true,
            });
        }

        let StreamRequest {
            prompt,
            resume,
            model,
            working_dir,
            cancel,
        } = request;
        let StreamCallbacks {
            on_progress,
            on_session_id,
            on_soft_ceiling,
            on_question,
        } = callbacks;

        let interactive = on_question.is_some();
        if interactive && resume.is_some() {
            warn!("interactive mode cannot resume a previous session; starting fresh");
        }
        let mode = if interactive {
            InvocationMode::Interactive
        } else {
            InvocationMode::Stream {
                prompt: &prompt,
                resume: resume.as_deref(),
            }
        };
        let model = model.as_deref().or(self.config.model.as_deref());

        let mut cmd = build_command(&self.config.binary, mode, model, &working_dir);
        let mut child = cmd.spawn().map_err(|err| AppError::Spawn(err.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture stderr".into()))?;
        let mut stdin: Option<ChildStdin> = if interactive {
            Some(
                child
                    .stdin
                    .take()
                    .ok_or_else(|| AppError::Spawn("failed to capture stdin".into()))?,
            )
        } else {
            None
        };

        info!(
            binary = %self.config.binary,
            interactive,
            resume = resume.is_some(),
            "agent subprocess spawned"
        );

        let stderr_tail = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = tokio::spawn(collect_stderr(stderr, Arc::clone(&stderr_tail)));

        // Interactive mode delivers the prompt as the first protocol message.
        if let Some(pipe) = stdin.as_mut() {
            write_message(pipe, &event::user_message(&prompt)).await?;
        }

        let activity = Arc::new(Notify::new());
        let mut frames = FramedRead::new(
            TrackedReader::new(stdout, Arc::clone(&activity)),
            NdjsonCodec::new(),
        );
        let mut timers = CallTimers::start(self.config.idle_timeout(), self.config.soft_ceiling());

        let mut last_text: Option<String> = None;
        let mut result_text: Option<String> = None;
        let mut session_id: Option<String> = None;
        let mut interrupted = false;

        'stream: loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("cancellation received, killing agent subprocess");
                    child.kill().await.ok();
                    interrupted = true;
                    break 'stream;
                }

                // Raw-chunk activity, not parsed events, feeds the idle timer.
                () = activity.notified() => {
                    timers.touch();
                }

                fired = timers.expired() => match fired {
                    TimerEvent::Idle => {
                        warn!(idle_secs = self.config.idle_timeout_seconds,
                            "idle window elapsed, killing agent subprocess");
                        child.kill().await.ok();
                        stderr_task.abort();
                        return Err(AppError::IdleTimeout {
                            idle_secs: self.config.idle_timeout_seconds,
                        });
                    }
                    TimerEvent::SoftCeiling => {
                        info!("soft ceiling reached, notifying caller");
                        if let Some(cb) = &on_soft_ceiling {
                            cb(SOFT_CEILING_MESSAGE);
                        }
                    }
                },

                frame = frames.next() => match frame {
                    None => {
                        debug!("agent stdout closed");
                        break 'stream;
                    }
                    Some(Err(err)) => {
                        // Oversized or undecodable frame; skip and continue.
                        warn!(error = %err, "skipping unreadable stdout frame");
                    }
                    Some(Ok(line)) => {
                        for ev in event::parse_line(&line) {
                            match ev {
                                StreamEvent::Init { session_id: sid } => {
                                    if session_id.is_none() {
                                        debug!(session_id = %sid, "subprocess session opened");
                                        if let Some(cb) = &on_session_id {
                                            cb(&sid);
                                        }
                                        session_id = Some(sid);
                                    }
                                }
                                StreamEvent::AssistantText { text } => {
                                    if let Some(cb) = &on_progress {
                                        cb(&progress_snippet(&text));
                                    }
                                    last_text = Some(text);
                                }
                                StreamEvent::ToolUse(tool) if tool.is_question() => {
                                    let Some(handler) = &on_question else {
                                        // No resolver registered: skip silently;
                                        // sibling tool events still flow.
                                        debug!("question event without handler, ignoring");
                                        continue;
                                    };
                                    let Some(batch) = tool.question_batch() else {
                                        warn!("malformed question input, ignoring");
                                        continue;
                                    };
                                    // AwaitingAnswer: unbounded human wait, so
                                    // both timers stop while we block here.
                                    // Cancellation must still cut the wait short.
                                    timers.suspend();
                                    let answers = tokio::select! {
                                        biased;
                                        () = cancel.cancelled() => {
                                            info!("cancellation received while awaiting an answer, \
                                                killing agent subprocess");
                                            child.kill().await.ok();
                                            interrupted = true;
                                            break 'stream;
                                        }
                                        answers = handler(batch) => answers,
                                    };
                                    if let Some(pipe) = stdin.as_mut() {
                                        write_message(
                                            pipe,
                                            &event::tool_result_message(&tool.id, &answers),
                                        )
                                        .await?;
                                    }
                                    timers.resume();
                                }
                                StreamEvent::ToolUse(tool) => {
                                    if let Some(cb) = &on_progress {
                                        cb(&tool_summary(&tool));
                                    }
                                }
                                StreamEvent::ResultText { text } => {
                                    result_text = Some(text);
                                }
                            }
                        }
                    }
                },
            }
        }

        // Settle: reap the child and collect the stderr tail. Timers and the
        // cancellation listener die with this scope, so a late cancel signal
        // has nothing left to kill.
        let status = child.wait().await?;
        let _ = stderr_task.await;
        let tail = {
            let buf = stderr_tail.lock().await;
            String::from_utf8_lossy(&buf).into_owned()
        };

        let accumulated = result_text.or(last_text).unwrap_or_default();

        if interrupted {
            return Ok(StreamOutcome {
                text: accumulated.trim().to_owned(),
                session_id,
                interrupted: true,
            });
        }

        if status.success() {
            let text = accumulated.trim().to_owned();
            if text.is_empty() {
                return Err(AppError::EmptyOutput);
            }
            return Ok(StreamOutcome {
                text,
                session_id,
                interrupted: false,
            });
        }

        match status.code() {
            // Signal-terminated or conventionally graceful shutdown codes:
            // partial result, not a failure.
            None => Ok(StreamOutcome {
                text: accumulated.trim().to_owned(),
                session_id,
                interrupted: true,
            }),
            Some(code) if GRACEFUL_EXIT_CODES.contains(&code) => Ok(StreamOutcome {
                text: accumulated.trim().to_owned(),
                session_id,
                interrupted: true,
            }),
            Some(code) => Err(AppError::NonZeroExit {
                code,
                stderr_tail: tail,
            }),
        }
    }
}

// ── Pipe helpers ──────────────────────────────────────────────────────────────

/// Serialize one protocol message and write it as an NDJSON line to stdin.
async fn write_message(stdin: &mut ChildStdin, message: &serde_json::Value) -> Result<()> {
    let mut bytes = serde_json::to_vec(message)
        .map_err(|err| AppError::Protocol(format!("failed to serialize message: {err}")))?;
    bytes.push(b'\n');
    stdin
        .write_all(&bytes)
        .await
        .map_err(|err| AppError::Io(format!("stdin write failed: {err}")))?;
    stdin
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("stdin flush failed: {err}")))?;
    Ok(())
}

/// Drain stderr into a keep-tail buffer capped at [`STDERR_TAIL_BYTES`].
async fn collect_stderr(mut stderr: ChildStderr, tail: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 1024];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buf = tail.lock().await;
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > STDERR_TAIL_BYTES {
                    let excess = buf.len() - STDERR_TAIL_BYTES;
                    buf.drain(..excess);
                }
            }
        }
    }
}

/// `AsyncRead` wrapper that signals on every raw chunk delivered.
///
/// The idle timer must reset on bytes arriving, not on parsed events: a
/// subprocess mid-way through a very long line is alive, not idle.
struct TrackedReader<R> {
    inner: R,
    activity: Arc<Notify>,
}

impl<R> TrackedReader<R> {
    fn new(inner: R, activity: Arc<Notify>) -> Self {
        Self { inner, activity }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            if buf.filled().len() > before {
                this.activity.notify_one();
            }
        }
        poll
    }
}
