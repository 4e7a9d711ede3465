//! Agent CLI invocation shaping.
//!
//! Three invocation shapes exist, differing only in argument layout and
//! stdin wiring:
//!
//! | Mode         | Prompt delivery        | Output format  | Stdin  |
//! |--------------|------------------------|----------------|--------|
//! | one-shot     | positional after `-p`  | `text`         | null   |
//! | stream       | positional after `-p`  | `stream-json`  | null   |
//! | interactive  | first protocol message | `stream-json`  | piped  |
//!
//! All shapes share environment sanitization: the agent CLI detects nested
//! sessions through a small set of environment variables, and a relayed
//! child must not conclude it is running inside another agent session.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Environment variables stripped before spawning so the child does not
/// mis-detect that it is itself being supervised.
pub const NESTED_SESSION_VARS: &[&str] = &[
    "CLAUDECODE",
    "CLAUDE_CODE_ENTRYPOINT",
    "CLAUDE_CODE_SSE_PORT",
];

/// Marker variable set on every spawned child to record subprocess status.
pub const SUPERVISED_MARKER: &str = "CLAUDECODE";

/// How the subprocess is invoked and how the prompt reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode<'a> {
    /// Plain text output, prompt as a positional argument.
    OneShotText {
        /// User prompt.
        prompt: &'a str,
    },
    /// NDJSON output, prompt as a positional argument, optional resume.
    Stream {
        /// User prompt.
        prompt: &'a str,
        /// Previous subprocess session id to re-attach to.
        resume: Option<&'a str>,
    },
    /// Bidirectional NDJSON; the prompt is written over the stdin pipe as the
    /// first protocol message, never as an argument.
    Interactive,
}

/// Build a ready-to-spawn [`Command`] for the given invocation shape.
#[must_use]
pub fn build_command(
    binary: &str,
    mode: InvocationMode<'_>,
    model: Option<&str>,
    working_dir: &Path,
) -> Command {
    let mut cmd = Command::new(binary);

    match mode {
        InvocationMode::OneShotText { prompt } => {
            cmd.arg("-p")
                .arg(prompt)
                .arg("--output-format")
                .arg("text");
            cmd.stdin(Stdio::null());
        }
        InvocationMode::Stream { prompt, resume } => {
            cmd.arg("-p").arg(prompt);
            if let Some(session_id) = resume {
                cmd.arg("--resume").arg(session_id);
            }
            cmd.arg("--output-format").arg("stream-json").arg("--verbose");
            cmd.stdin(Stdio::null());
        }
        InvocationMode::Interactive => {
            cmd.arg("-p")
                .arg("--input-format")
                .arg("stream-json")
                .arg("--output-format")
                .arg("stream-json")
                .arg("--verbose");
            cmd.stdin(Stdio::piped());
        }
    }

    if let Some(model) = model {
        cmd.arg("--model").arg(model);
    }

    sanitize_env(&mut cmd);

    cmd.current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd
}

/// Strip nested-session detection variables and set the supervision marker.
fn sanitize_env(cmd: &mut Command) {
    for var in NESTED_SESSION_VARS {
        cmd.env_remove(var);
    }
    cmd.env(SUPERVISED_MARKER, "");
}
