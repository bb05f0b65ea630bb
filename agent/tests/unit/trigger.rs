//! Trigger coordinator: serialisation, scheduling and push handling.

#![allow(clippy::expect_used)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use hoist_agent::application::services::{RestartRequested, TriggerCoordinator, UpdateAgent};
use hoist_agent::domain::{UpdateError, WorkMode};
use hoist_common::{AssetManifest, ContainerState, encode};

use crate::mocks::{
    FakeHost, InMemoryRuntime, RecordingTransport, StaticSource, agent_component, component, config,
    manifest,
};

const INTERVAL: Duration = Duration::from_secs(3600);

fn asset() -> Option<AssetManifest> {
    Some(AssetManifest {
        url: "https://assets.local/manifest".into(),
    })
}

#[tokio::test]
async fn concurrent_triggers_never_overlap() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![
        component("api", "reg/api:2"),
        component("web", "reg/web:3"),
    ]));
    let pushed = encode(&manifest(vec![
        component("api", "reg/api:3"),
        component("db", "reg/db:5"),
    ]))
    .expect("encode");

    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    let (scheduled, push) = tokio::join!(
        coordinator.scheduled_pass(),
        coordinator.push_pass(pushed.as_bytes()),
    );

    assert!(scheduled.expect("scheduled").is_clean());
    assert!(push.expect("push").is_clean());
    assert!(!runtime.overlapped(), "passes interleaved: {:?}", runtime.mutations());
    assert_eq!(transport.heartbeats().len(), 2);
}

#[tokio::test]
async fn undecodable_push_changes_nothing() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    let err = coordinator.push_pass(b"not a manifest").await.expect_err("decode fails");

    assert!(format!("{err:#}").contains("decoding pushed update manifest"));
    assert!(runtime.calls().is_empty());
    assert!(transport.heartbeats().is_empty());
}

#[tokio::test]
async fn plain_json_push_is_accepted() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);
    let json = serde_json::to_vec(&manifest(vec![component("api", "reg/api:2")])).expect("json");

    let report = coordinator.push_pass(&json).await.expect("push");

    assert_eq!(report.outcomes.len(), 1);
    assert!(runtime.container("api").is_some());
}

#[tokio::test]
async fn scheduled_pass_without_asset_is_a_configuration_error() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, None, INTERVAL);

    let err = coordinator.scheduled_pass().await.expect_err("no asset");

    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::Configuration(_))
    ));
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn fetch_failure_aborts_before_any_component() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![component("api", "reg/api:2")]));
    source.fail.store(true, Ordering::SeqCst);
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    assert!(coordinator.scheduled_pass().await.is_err());
    assert!(runtime.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scheduled_loop_repeats_after_each_interval() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![component("api", "reg/api:2")]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    tokio::select! {
        _ = coordinator.run_scheduled() => panic!("no restart was requested"),
        () = tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)) => {}
    }

    assert_eq!(source.fetches(), 3);
    assert_eq!(transport.heartbeats().len(), 3);
    let creates = runtime.mutations().iter().filter(|c| c.starts_with("create")).count();
    assert_eq!(creates, 1, "later passes find the container up to date");
}

#[tokio::test(start_paused = true)]
async fn scheduled_failures_keep_the_loop_alive() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    source.fail.store(true, Ordering::SeqCst);
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    tokio::select! {
        _ = coordinator.run_scheduled() => panic!("no restart was requested"),
        () = tokio::time::sleep(INTERVAL + Duration::from_secs(1)) => {}
    }

    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn pushed_self_update_ends_the_push_loop() {
    let runtime = InMemoryRuntime::new().with_container("updater", "reg/hoist:1", ContainerState::Running);
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    transport.push(b"garbage".to_vec());
    transport.push(encode(&manifest(vec![agent_component("reg/hoist:2")])).expect("encode"));

    let restart = coordinator.run(WorkMode::Sub).await.expect("restart");

    assert_eq!(restart, RestartRequested);
    assert!(host.marker());
    let started = transport
        .events()
        .iter()
        .filter(|e| e.kind == hoist_common::EventType::Started)
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn sub_mode_fails_when_the_subscription_ends() {
    let runtime = InMemoryRuntime::new();
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    transport.push(encode(&manifest(vec![component("api", "reg/api:2")])).expect("encode"));
    transport.close();

    let err = coordinator.run(WorkMode::Sub).await.expect_err("subscription ended");
    assert!(err.to_string().contains("subscription ended"));
    assert!(runtime.container("api").is_some(), "queued manifests are still applied");
}

#[tokio::test(start_paused = true)]
async fn dual_mode_survives_a_refused_subscription() {
    let runtime = InMemoryRuntime::new().with_container("updater", "reg/hoist:1", ContainerState::Running);
    let transport = RecordingTransport::new();
    transport.fail_subscribe.store(true, Ordering::SeqCst);
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![component("api", "reg/api:2")]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    let run = coordinator.run(WorkMode::Dual);
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => panic!("dual mode must keep polling"),
        () = tokio::time::sleep(Duration::from_secs(1)) => {}
    }
    assert_eq!(source.fetches(), 1);
    assert!(runtime.container("api").is_some());

    source.set(manifest(vec![agent_component("reg/hoist:2")]));
    let restart = tokio::time::timeout(INTERVAL * 2, run)
        .await
        .expect("second scheduled pass")
        .expect("restart");
    assert_eq!(restart, RestartRequested);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn dual_mode_push_restart_wins() {
    let runtime = InMemoryRuntime::new().with_container("updater", "reg/hoist:1", ContainerState::Running);
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    // The scheduled trigger sees an up-to-date manifest.
    let source = StaticSource::new(manifest(vec![]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    transport.push(encode(&manifest(vec![agent_component("reg/hoist:2")])).expect("encode"));

    let restart = tokio::time::timeout(Duration::from_secs(10), coordinator.run(WorkMode::Dual))
        .await
        .expect("push pass finishes")
        .expect("restart");

    assert_eq!(restart, RestartRequested);
    assert!(!runtime.overlapped());
}

#[tokio::test(start_paused = true)]
async fn started_is_announced_while_a_pass_holds_the_lock() {
    let runtime = InMemoryRuntime::new();
    *runtime.pull_delay.lock().expect("delay") = Duration::from_secs(30 * 60);
    let transport = RecordingTransport::new();
    let host = FakeHost::new();
    let config = config();
    let source = StaticSource::new(manifest(vec![component("api", "reg/api:2")]));
    let agent = UpdateAgent::new(&runtime, &transport, &host, &config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset(), INTERVAL);

    tokio::select! {
        biased;
        _ = coordinator.scheduled_pass() => panic!("the pull is still in progress"),
        _ = async {
            tokio::task::yield_now().await;
            coordinator.run_push().await
        } => panic!("the subscription stays open"),
        () = tokio::time::sleep(Duration::from_secs(60)) => {}
    }

    let started = transport
        .events()
        .iter()
        .filter(|e| e.kind == hoist_common::EventType::Started)
        .count();
    assert_eq!(started, 1);
    assert!(
        !runtime.mutations().iter().any(|c| c.starts_with("create")),
        "the scheduled pass has not finished"
    );
}
