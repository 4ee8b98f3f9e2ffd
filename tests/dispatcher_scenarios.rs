//! End-to-end tool flows against the in-memory provider.

use e2b_mcp::sandbox::fake::FakeProvider;
use e2b_mcp::sandbox::{SandboxLimits, SandboxRegistry};
use e2b_mcp::tools::ToolDispatcher;
use serde_json::{json, Value};
use std::sync::Arc;

fn setup(max_sandboxes: usize) -> (Arc<FakeProvider>, ToolDispatcher) {
    let provider = Arc::new(FakeProvider::new());
    let registry = Arc::new(SandboxRegistry::new(
        provider.clone(),
        SandboxLimits {
            max_sandboxes,
            ..SandboxLimits::default()
        },
    ));
    (provider, ToolDispatcher::new(registry))
}

async fn create(dispatcher: &ToolDispatcher) -> String {
    let out = dispatcher.dispatch("create_sandbox", json!({})).await.unwrap();
    out.data["sandboxId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn capacity_is_freed_by_kill() {
    let (_, d) = setup(2);

    let a = create(&d).await;
    assert_eq!(d.registry().stats().active_sandboxes, 1);
    let b = create(&d).await;
    assert_eq!(d.registry().stats().active_sandboxes, 2);

    let err = d.dispatch("create_sandbox", json!({})).await.unwrap_err();
    assert_eq!(err.code(), "capacity_exceeded");
    assert_eq!(err.to_string(), "Maximum number of sandboxes (2) reached");

    let out = d.dispatch("kill_sandbox", json!({"sandboxId": a})).await.unwrap();
    assert_eq!(out.data["stats"]["active_sandboxes"], 1);
    assert_eq!(out.data["stats"]["sandbox_ids"], json!([b]));

    let c = create(&d).await;
    assert_ne!(c, a);
    assert_eq!(d.registry().len(), 2);
}

#[tokio::test]
async fn written_file_reads_back_identically() {
    let (_, d) = setup(1);
    let id = create(&d).await;
    let contents = "line one\nline two ✓\n";

    let out = d
        .dispatch(
            "write_file",
            json!({"filePath": "/home/user/notes.txt", "fileContents": contents, "sandboxId": id}),
        )
        .await
        .unwrap();
    assert_eq!(out.data["size"], contents.len());

    let out = d
        .dispatch("read_file", json!({"filePath": "/home/user/notes.txt", "sandboxId": id}))
        .await
        .unwrap();
    assert_eq!(out.data["content"], contents);
}

#[tokio::test]
async fn listing_root_succeeds() {
    let (_, d) = setup(1);
    let id = create(&d).await;

    let out = d
        .dispatch(
            "run_command",
            json!({"command": "ls -la", "sandboxId": id, "background": false}),
        )
        .await
        .unwrap();
    assert_eq!(out.data["exit_code"], 0);
    assert!(out.data["stdout"].is_string());
    assert!(out.data["stderr"].is_string());
}

#[tokio::test]
async fn url_for_unknown_sandbox_is_not_found() {
    let (provider, d) = setup(1);
    let err = d
        .dispatch("get_sandbox_url", json!({"port": 3000, "sandboxId": "X"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "sandbox_not_found");
    assert_eq!(err.to_string(), "Sandbox X not found");
    assert_eq!(provider.create_calls(), 0);
}

#[tokio::test]
async fn temporary_sandbox_is_terminated_once() {
    let (provider, d) = setup(1);

    d.dispatch("run_code", json!({"code": "print('ok')"}))
        .await
        .unwrap();
    assert_eq!(provider.kills(), vec!["sbx-1".to_string()]);

    provider.fail_code(true);
    d.dispatch("run_code", json!({"code": "print('ok')"}))
        .await
        .unwrap_err();
    assert_eq!(
        provider.kills(),
        vec!["sbx-1".to_string(), "sbx-2".to_string()]
    );
    assert!(d.registry().is_empty());
}

#[tokio::test]
async fn listing_is_idempotent() {
    let (_, d) = setup(3);
    create(&d).await;
    create(&d).await;

    let first: Value = d.dispatch("list_sandbox_ids", json!({})).await.unwrap().data;
    let second: Value = d.dispatch("list_sandbox_ids", json!({})).await.unwrap().data;
    assert_eq!(first["sandbox_ids"], second["sandbox_ids"]);
    assert_eq!(first["active_sandboxes"], second["active_sandboxes"]);
    assert_eq!(first["active_sandboxes"], 2);
}

#[tokio::test]
async fn concurrent_creates_never_exceed_capacity() {
    let (_, d) = setup(3);
    let d = Arc::new(d);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let d = Arc::clone(&d);
        tasks.push(tokio::spawn(async move {
            d.dispatch("create_sandbox", json!({})).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => {
                assert_eq!(e.code(), "capacity_exceeded");
                rejected += 1;
            }
        }
    }
    assert_eq!(created, 3);
    assert_eq!(rejected, 7);
    assert_eq!(d.registry().len(), 3);
}

#[tokio::test]
async fn cleanup_terminates_everything_despite_failures() {
    let (provider, d) = setup(3);
    for _ in 0..3 {
        create(&d).await;
    }
    provider.fail_kill(true);

    let report = d.registry().cleanup_all().await;
    assert_eq!(report.failed.len(), 3);
    assert_eq!(provider.kills().len(), 3);
    assert!(d.registry().is_empty());
}

#[tokio::test]
async fn invalid_arguments_do_not_touch_the_provider() {
    let (provider, d) = setup(1);
    let err = d
        .dispatch("create_sandbox", json!({"timeoutMs": 10}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_arguments");
    assert_eq!(provider.create_calls(), 0);

    let err = d
        .dispatch("get_sandbox_url", json!({"port": 0, "sandboxId": "X"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_arguments");
}
