//! Global subscriber initialisation (own test binary: installs a process-wide subscriber)

use tokenrelay::telemetry::{OutputFormat, SubscriberConfig, init_subscriber};

#[test]
fn file_subscriber_writes_json_and_tolerates_reinit() {
    let path = std::env::temp_dir().join(format!("tokenrelay-telemetry-{}.log", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let config = SubscriberConfig::builder()
        .log_level(tracing::Level::DEBUG)
        .output_format(OutputFormat::Json)
        .log_file(path.clone())
        .build();
    let guard = init_subscriber(config).expect("first init succeeds");
    assert!(guard.is_some(), "file logging returns a worker guard");

    tracing::warn!(session_id = "s-1", "relay telemetry check");
    drop(guard);

    let written = std::fs::read_to_string(&path).expect("log file exists");
    assert!(written.contains("relay telemetry check"));
    assert!(written.contains("\"session_id\":\"s-1\""));

    let again = init_subscriber(SubscriberConfig::debug()).expect("re-init is not an error");
    assert!(again.is_none());

    let _ = std::fs::remove_file(&path);
}
