use std::io::Write;

use rq_domain::config::ConfigSeverity;
use rq_domain::MissedPolicy;
use rq_scheduler::cli::{config, load_config_from};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let cfg = load_config_from(path.to_str().unwrap()).unwrap();
    assert!(cfg.jobs.is_empty());
    assert_eq!(cfg.scheduler.event_buffer, 64);
    assert_eq!(cfg.observability.service_name, "repeatq");
}

#[test]
fn loads_jobs_and_scheduler_settings() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[scheduler]
missed_policy = "skip"
shutdown_grace_ms = 250

[[jobs]]
name = "nightly-report"
payload = {{ queue = "reports" }}

[jobs.repeat]
pattern = "0 13 * * *"
immediately = true

[[jobs]]
name = "standup"

[jobs.repeat]
pattern = """
DTSTART;TZID=UTC:20250722T000000Z
RRULE:FREQ=DAILY;INTERVAL=1;BYHOUR=13;BYMINUTE=42;WKST=MO"""
limit = 10
"#
    )
    .unwrap();

    let cfg = load_config_from(file.path().to_str().unwrap()).unwrap();
    assert_eq!(cfg.scheduler.missed_policy, MissedPolicy::Skip);
    assert_eq!(cfg.scheduler.shutdown_grace_ms, 250);
    assert_eq!(cfg.jobs.len(), 2);
    assert_eq!(cfg.jobs[0].payload["queue"], "reports");
    assert!(cfg.jobs[0].repeat.immediate);
    assert_eq!(cfg.jobs[1].repeat.limit, Some(10));

    assert!(config::issues(&cfg).is_empty());
}

#[test]
fn malformed_toml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[[jobs]\nname = ").unwrap();
    let err = load_config_from(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().starts_with("parsing "));
    // The TOML parser's own message stays in the chain.
    assert!(err.chain().count() >= 2);
    assert!(err.root_cause().downcast_ref::<toml::de::Error>().is_some());
}

#[test]
fn unreadable_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config_from(dir.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().starts_with("reading "));
    assert!(err.root_cause().downcast_ref::<std::io::Error>().is_some());
}

#[test]
fn invalid_patterns_surface_in_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[[jobs]]
name = "broken"
[jobs.repeat]
pattern = "every day at noon"
"#
    )
    .unwrap();

    let cfg = load_config_from(file.path().to_str().unwrap()).unwrap();
    let issues = config::issues(&cfg);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Error);
    assert_eq!(issues[0].field, "jobs[0].repeat.pattern");
    assert!(!config::validate(&cfg, "broken.toml"));
}
