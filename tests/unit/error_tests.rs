//! Error display and conversion tests.

use agent_relay::AppError;

#[test]
fn display_formats_carry_the_diagnostic_payload() {
    let cases = [
        (
            AppError::Config("bad toml".into()),
            "config: bad toml",
        ),
        (
            AppError::Store("disk full".into()),
            "store: disk full",
        ),
        (
            AppError::Timeout { elapsed_secs: 300 },
            "timeout: subprocess killed after 300s",
        ),
        (
            AppError::IdleTimeout { idle_secs: 45 },
            "idle timeout: no output for 45s, subprocess killed",
        ),
        (
            AppError::NonZeroExit {
                code: 3,
                stderr_tail: "boom".into(),
            },
            "subprocess exited with code 3: boom",
        ),
        (
            AppError::EmptyOutput,
            "subprocess exited cleanly but produced no output",
        ),
        (
            AppError::Protocol("line too long".into()),
            "protocol: line too long",
        ),
        (AppError::Io("broken pipe".into()), "io: broken pipe"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn spawn_display_hints_at_a_missing_binary() {
    let err = AppError::Spawn("No such file or directory".into());
    let rendered = err.to_string();
    assert!(rendered.starts_with("spawn: No such file or directory"));
    assert!(rendered.contains("installed and on PATH"));
}

#[test]
fn io_errors_convert_with_their_message() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_err = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
    let err = AppError::from(parse_err);
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}
