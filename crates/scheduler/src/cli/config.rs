use rq_domain::config::{Config, ConfigError, ConfigSeverity};
use rq_trigger::TriggerResolver;

/// Structural issues plus one error per job whose pattern the resolver
/// rejects.
pub fn issues(config: &Config) -> Vec<ConfigError> {
    let mut issues = config.validate();
    let resolver = TriggerResolver::new();
    for (i, job) in config.jobs.iter().enumerate() {
        let Some(pattern) = job.repeat.pattern.as_deref() else {
            continue;
        };
        if let Err(e) = resolver.check_pattern(pattern) {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("jobs[{i}].repeat.pattern"),
                message: e.to_string(),
            });
        }
    }
    issues
}

/// Parse and validate the config, printing any issues.
///
/// Returns `false` when errors are found (the caller exits with code 1).
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = issues(config);

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count, warning_count,
    );

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
    print!("{output}");
    Ok(())
}
