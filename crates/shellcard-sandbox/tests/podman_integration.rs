//! Integration tests against a real rootless podman.
//!
//! Run with: cargo test -p shellcard-sandbox -- --ignored
//! Requires podman on PATH and the alpine:3.18 image (pulled on demand,
//! so the first run needs network access for the pull).

use std::collections::BTreeMap;
use std::time::Duration;

use shellcard_core::traits::{ContainerLifecycle, ExecutionConfig, Sandbox};
use shellcard_sandbox::PodmanDriver;

const IMAGE: &str = "alpine:3.18";

fn shell(config: ExecutionConfig, command: &str) -> ExecutionConfig {
    config.with_command(["/bin/sh", "-c", command])
}

fn base_config() -> ExecutionConfig {
    ExecutionConfig::new()
        .with_image(IMAGE)
        .with_correlation_id("itest")
}

#[tokio::test]
#[ignore]
async fn simple_command_succeeds() {
    let driver = PodmanDriver::new().unwrap();

    let result = driver
        .run(shell(base_config(), "echo hello"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello\n");
    assert!(!result.container_id.is_empty());
    assert_eq!(result.image_used, IMAGE);

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn nonzero_exit_is_an_outcome_not_an_error() {
    let driver = PodmanDriver::new().unwrap();

    let result = driver.run(shell(base_config(), "exit 3")).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, 3);
    assert!(!result.timed_out);

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn timeout_terminates_and_reports_minus_one() {
    let driver = PodmanDriver::new().unwrap();

    let config = shell(base_config(), "sleep 5").with_timeout(Duration::from_secs(1));
    let result = driver.run(config).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.timed_out);
    assert!(result.duration < Duration::from_secs(3));

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn read_only_root_is_enforced() {
    let driver = PodmanDriver::new().unwrap();

    let result = driver
        .run(shell(base_config(), "echo x > /x 2>&1 || echo blocked"))
        .await
        .unwrap();
    assert!(result.success);
    assert!(
        result.stdout.contains("blocked"),
        "writing to / must fail on a read-only root, got stdout {:?}",
        result.stdout
    );

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn network_disabled_by_default_enabled_on_opt_in() {
    let driver = PodmanDriver::new().unwrap();
    // With --network=none only the loopback interface exists.
    let result = driver
        .run(shell(base_config(), "ip link | grep -c UP"))
        .await
        .unwrap();
    let interfaces: i32 = result.stdout.trim().parse().unwrap_or(0);
    assert!(interfaces <= 1, "expected loopback only, got {interfaces}");
    driver.cleanup().await.unwrap();

    let driver = PodmanDriver::new().unwrap();
    let result = driver
        .run(shell(base_config().with_networking(true), "echo ok"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "ok\n");
    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn session_container_is_reused_across_runs() {
    let driver = PodmanDriver::new().unwrap();

    let first = driver
        .run(shell(base_config(), "echo test > /tmp/state"))
        .await
        .unwrap();
    let second = driver.run(shell(base_config(), "cat /tmp/state")).await.unwrap();

    assert_eq!(first.container_id, second.container_id);
    assert_eq!(second.stdout, "test\n", "tmpfs state must survive within the session");

    // After cleanup a new run gets a fresh identity.
    driver.cleanup().await.unwrap();
    let third = driver.run(shell(base_config(), "echo x")).await.unwrap();
    assert_ne!(first.container_id, third.container_id);

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn cleanup_twice_is_a_no_op() {
    let driver = PodmanDriver::new().unwrap();
    driver.run(shell(base_config(), "echo x")).await.unwrap();

    driver.cleanup().await.unwrap();
    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn assets_are_materialized_into_tmpfs() {
    let driver = PodmanDriver::new().unwrap();

    let assets = BTreeMap::from([(
        "notes/config.json".to_string(),
        b"{\"answer\":42}".to_vec(),
    )]);
    let config = shell(
        base_config().with_assets(assets),
        "cat /tmp/assets/notes/config.json",
    );
    let result = driver.run(config).await.unwrap();
    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "{\"answer\":42}");

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn cancellation_mid_exec_leaves_driver_cleanable() {
    let driver = PodmanDriver::new().unwrap();

    // An external cancellation drops the run future; kill_on_drop reaps the
    // child and the card is simply never rated.
    let config = shell(base_config(), "sleep 60").with_timeout(Duration::from_secs(60));
    let run = driver.run(config);
    let outcome = tokio::time::timeout(Duration::from_millis(100), run).await;
    assert!(outcome.is_err(), "run should still be in flight when we cancel");

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn per_card_lifecycle_runs_without_session_state() {
    let driver = PodmanDriver::new().unwrap().with_lifecycle(ContainerLifecycle::PerCard);

    let result = driver.run(shell(base_config(), "echo solo")).await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "solo\n");
    assert!(result.container_id.is_empty(), "per-card runs hold no session identity");

    driver.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn availability_probe() {
    PodmanDriver::is_available().await.unwrap();
}
