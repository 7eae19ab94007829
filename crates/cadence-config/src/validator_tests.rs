use super::*;
use crate::loader::ConfigLoader;
use cadence_core::JobRequest;

fn job(name: &str) -> JobRequest {
    JobRequest::new(name, "test")
}

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_zero_poll_interval() {
    let mut config = Config::default();
    config.engine.poll_interval_ms = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "engine.poll_interval_ms"));
}

#[test]
fn test_validate_engine_warnings() {
    let mut config = Config::default();
    config.engine.max_concurrent_jobs = 0;
    config.engine.misfire_threshold_ms = 10;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "engine.max_concurrent_jobs"));
    assert!(result.warnings.iter().any(|w| w.path == "engine.misfire_threshold_ms"));
}

#[test]
fn test_validate_log_level() {
    let mut config = Config::default();
    config.logging.level = "verbose".to_string();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "logging.level"));

    config.logging.level = "cadence_core=debug,info".to_string();
    assert!(ConfigValidator::validate(&config).unwrap().is_valid());
}

#[test]
fn test_validate_duplicate_jobs() {
    let mut config = Config::default();
    config.jobs = vec![job("a"), job("a")];

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "jobs[1]"));

    config.engine.overwrite_existing_jobs = true;
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "jobs[1]"));
}

#[test]
fn test_validate_job_fields() {
    let mut bad_cron = job("cron");
    bad_cron.cron_expression = Some("sixty * * *".to_string());
    let mut no_name = job("");
    no_name.job_ref = " ".to_string();

    let mut config = Config::default();
    config.jobs = vec![bad_cron, no_name];

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].trigger"));
    assert!(result.errors.iter().any(|e| e.path == "jobs[1].name"));
    assert!(result.errors.iter().any(|e| e.path == "jobs[1].job"));
}

#[test]
fn test_validate_past_start_warning() {
    let config = ConfigLoader::load_str(
        r#"
        [[jobs]]
        name = "old"
        start_at = "2001-01-01T00:00:00Z"
        "#,
    )
    .unwrap();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "jobs[0].start_at"));
}

#[test]
fn test_validate_with_known_jobs() {
    let mut config = Config::default();
    let mut custom = job("custom");
    custom.job_ref = "report".to_string();
    config.jobs = vec![job("nap"), custom];

    let known = vec!["log".to_string(), "sleep".to_string()];
    let result = ConfigValidator::validate_with_jobs(&config, &known).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "jobs[1].job");
    assert!(result.errors[0].message.contains("report"));
}

#[test]
fn test_validation_result_default() {
    let result = ValidationResult::default();
    assert!(result.is_valid());
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());
}
