//! Unit tests for `AppError` display and conversions.

use batch_conductor::AppError;

#[test]
fn display_prefixes_each_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Acquisition("no gpu".into()), "acquisition: no gpu"),
        (AppError::Storage("disk full".into()), "storage: disk full"),
        (AppError::Execution("boom".into()), "execution: boom"),
        (AppError::Protocol("eof".into()), "protocol: eof"),
        (AppError::Io("denied".into()), "io: denied"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_acquisition_and_config_are_fatal() {
    assert!(AppError::Acquisition(String::new()).is_fatal());
    assert!(AppError::Config(String::new()).is_fatal());
    assert!(!AppError::Storage(String::new()).is_fatal());
    assert!(!AppError::Execution(String::new()).is_fatal());
    assert!(!AppError::Protocol(String::new()).is_fatal());
    assert!(!AppError::Io(String::new()).is_fatal());
}

#[test]
fn toml_error_maps_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("= nope")
        .expect_err("invalid toml")
        .into();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn json_error_maps_to_protocol() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{oops")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Protocol(ref msg) if msg.starts_with("malformed json")));
}

#[test]
fn io_error_maps_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(err.to_string(), "io: nope");
}

#[test]
fn message_strips_kind_prefix() {
    let err = AppError::Execution("unrecognized state blob (3 bytes)".into());
    assert_eq!(err.message(), "unrecognized state blob (3 bytes)");
}
