//! Unit tests for the application error type.

use chat_relay::AppError;

#[test]
fn display_prefixes_name_the_domain() {
    assert_eq!(
        AppError::Config("bad port".into()).to_string(),
        "config: bad port"
    );
    assert_eq!(AppError::Db("locked".into()).to_string(), "db: locked");
    assert_eq!(
        AppError::SessionNotFound("abc".into()).to_string(),
        "session not found: abc"
    );
    assert_eq!(
        AppError::UpstreamUnavailable("refused".into()).to_string(),
        "upstream unavailable: refused"
    );
    assert_eq!(
        AppError::UpstreamTimeout("30s".into()).to_string(),
        "upstream timeout: 30s"
    );
    assert_eq!(AppError::ChannelClosed.to_string(), "channel closed");
    assert_eq!(
        AppError::Persistence("disk full".into()).to_string(),
        "persistence: disk full"
    );
    assert_eq!(AppError::Auth("expired".into()).to_string(), "auth: expired");
}

#[test]
fn toml_errors_convert_to_config() {
    let err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let app: AppError = err.into();
    assert!(matches!(app, AppError::Config(_)));
}

#[test]
fn errors_are_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::ChannelClosed);
    assert_eq!(err.to_string(), "channel closed");
}
