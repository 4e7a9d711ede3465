//! One-shot text call outcomes.

use agent_relay::AppError;

use super::common::{engine, stub_agent};

#[tokio::test]
async fn successful_call_returns_trimmed_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_agent(&dir, "printf '  hello from the agent  \\n'");

    let text = engine(&stub).one_shot("hi", None, dir.path()).await.unwrap();
    assert_eq!(text, "hello from the agent");
}

#[tokio::test]
async fn prompt_is_delivered_as_an_argument() {
    let dir = tempfile::tempdir().unwrap();
    // Echo back the argument after the -p flag.
    let stub = stub_agent(&dir, r#"shift; printf '%s\n' "$1""#);

    let text = engine(&stub)
        .one_shot("summarize the log", None, dir.path())
        .await
        .unwrap();
    assert_eq!(text, "summarize the log");
}

#[tokio::test]
async fn clean_exit_with_blank_stdout_is_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_agent(&dir, "printf '   \\n'");

    let err = engine(&stub)
        .one_shot("hi", None, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyOutput));
}

#[tokio::test]
async fn nonzero_exit_carries_the_stderr_tail() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_agent(&dir, "echo 'bad flag' >&2\nexit 2");

    let err = engine(&stub)
        .one_shot("hi", None, dir.path())
        .await
        .unwrap_err();
    match err {
        AppError::NonZeroExit { code, stderr_tail } => {
            assert_eq!(code, 2);
            assert!(stderr_tail.contains("bad flag"));
        }
        other => panic!("expected NonZeroExit, got {other}"),
    }
}
