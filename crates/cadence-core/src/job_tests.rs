use super::*;
use serde_json::json;

#[test]
fn test_job_key_display_and_default_group() {
    let key = JobKey::in_default_group("cleanup");
    assert_eq!(key.group, DEFAULT_GROUP);
    assert_eq!(key.to_string(), "DEFAULT.cleanup");
}

#[test]
fn test_job_key_validate() {
    assert!(JobKey::new("a", "b").validate().is_ok());
    assert!(matches!(
        JobKey::new("", "b").validate(),
        Err(SchedulerError::InvalidKey(_))
    ));
    assert!(matches!(
        JobKey::new("a", "  ").validate(),
        Err(SchedulerError::InvalidKey(_))
    ));
}

#[test]
fn test_descriptor_builder() {
    let desc = JobDescriptor::new(JobKey::new("report", "nightly"), "sleep")
        .with_value("iterations", 3)
        .with_description("Nightly report");

    assert_eq!(desc.job_ref, "sleep");
    assert_eq!(desc.data.get("iterations"), Some(&json!(3)));
    assert_eq!(desc.description.as_deref(), Some("Nightly report"));
}

#[test]
fn test_context_payload_accessors() {
    let mut data = JobData::new();
    data.insert("target".to_string(), json!("inbox"));
    data.insert("limit".to_string(), json!(25));
    let ctx = JobContext::new(JobKey::in_default_group("j"), data, CancellationToken::new());

    assert_eq!(ctx.get_str("target"), Some("inbox"));
    assert_eq!(ctx.get_u64("limit"), Some(25));
    assert_eq!(ctx.get_u64("target"), None);
    assert_eq!(ctx.times_fired(), 1);
    assert!(!ctx.is_misfire());
}

#[tokio::test]
async fn test_context_sleep_interrupted() {
    let token = CancellationToken::new();
    let ctx = JobContext::new(JobKey::in_default_group("j"), JobData::new(), token.clone());

    assert!(ctx.check_interrupted().is_ok());
    token.cancel();
    assert!(ctx.is_interrupted());
    assert_eq!(ctx.check_interrupted(), Err(JobError::Interrupted));

    let started = std::time::Instant::now();
    let result = ctx.sleep(Duration::from_secs(30)).await;
    assert_eq!(result, Err(JobError::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_context_sleep_completes() {
    let ctx = JobContext::new(
        JobKey::in_default_group("j"),
        JobData::new(),
        CancellationToken::new(),
    );
    assert!(ctx.sleep(Duration::from_millis(5)).await.is_ok());
}

#[tokio::test]
async fn test_registry_register_fn_and_resolve() {
    let registry = JobRegistry::new();
    assert!(registry.is_empty());

    registry.register_fn("fails", |ctx: JobContext| async move {
        Err(JobError::execution(format!("{} failed", ctx.key())))
    });
    registry.register_fn("ok", |_ctx: JobContext| async { Ok(()) });

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["fails".to_string(), "ok".to_string()]);
    assert!(registry.contains("ok"));
    assert!(registry.resolve("missing").is_none());

    let job = registry.resolve("fails").unwrap();
    let ctx = JobContext::new(
        JobKey::new("x", "g"),
        JobData::new(),
        CancellationToken::new(),
    );
    let err = job.execute(ctx).await.unwrap_err();
    assert_eq!(err, JobError::Execution("g.x failed".to_string()));

    assert!(registry.unregister("fails"));
    assert!(!registry.contains("fails"));
}
