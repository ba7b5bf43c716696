// tests/image_rebuilds.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, InventoryBuilder, image};
use crate::common::{TestHarness, compose_state, init_tracing, rpm_signed, with_timeout};

use std::error::Error;

use serde_json::{Value, json};

use rebuildd::rules::{Rule, RuleValue};
use rebuildd::types::ArtifactBuildState;

type TestResult = Result<(), Box<dyn Error>>;

const NVR: &str = "bash-4.4-1.fc30";

/// One fully signed advisory shipping `bash` into content set `cs1`, where
/// image `Y` is layered on image `X` and both contain bash.
fn bash_inventory() -> InventoryBuilder {
    InventoryBuilder::new()
        .advisory(1, "RHSA-2020-0001", "QE", &[NVR], true, &["repo-1"])
        .content_sets("repo-1", &["cs1"])
        .package(NVR, "bash", &["bash-doc", "bash"], Some("f30-candidate"))
        .image(image("X-1-1", None, &["cs1"], &["bash"]))
        .image(image("Y-1-1", Some("X-1-1"), &["cs1"], &["bash"]))
}

#[tokio::test]
async fn signed_rpm_plans_parent_image_before_child() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, bash_inventory().build());

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    assert_eq!(h.batches_for("sign-1"), vec![vec!["X-1-1"], vec!["Y-1-1"]]);

    let builds = h.builds_for("sign-1");
    assert!(builds.iter().all(|b| b.state == ArtifactBuildState::Planned));
    assert_eq!(builds[0].depends_on, None);
    assert_eq!(builds[1].depends_on, Some(builds[0].id));
    assert_eq!(builds[1].build_arg("parent"), Some(&json!("X-1-1")));

    for build in &builds {
        assert_eq!(build.build_arg("compose_id"), Some(&json!(1)));
        let repo = build
            .build_arg("compose_repo")
            .and_then(Value::as_str)
            .expect("compose repo recorded");
        assert!(repo.ends_with("odcs-1.repo"), "unexpected repo {repo}");
    }

    assert_eq!(
        h.memory.requested_composes(),
        vec![(
            "f30-candidate".to_string(),
            vec!["bash".to_string(), "bash-doc".to_string()]
        )]
    );

    let stats = h.stats();
    assert_eq!(stats.received_total, 1);
    assert_eq!(stats.received_passed, 1);
    assert_eq!(stats.handled_total, 1);
    assert_eq!(stats.handler_failures, 0);
    Ok(())
}

#[tokio::test]
async fn failed_compose_fails_every_planned_build() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let inventory = bash_inventory().compose_script(&[0, 4]).build();
    let mut h = TestHarness::new(&cfg, inventory);

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    let builds = h.builds_for("sign-1");
    assert_eq!(builds.len(), 2);
    for build in &builds {
        assert_eq!(build.state, ArtifactBuildState::Failed);
        let reason = build.state_reason.as_deref().unwrap_or_default();
        assert!(reason.contains("odcs/1/composes/1"), "unexpected reason {reason}");
        assert!(build.time_completed.is_some());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn compose_timeout_leaves_plan_for_compose_event_to_settle() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_compose_timing("10ms", "50ms")
        .build();
    let inventory = bash_inventory().compose_script(&[1]).build();
    let mut h = TestHarness::new(&cfg, inventory);

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    let builds = h.builds_for("sign-1");
    assert!(builds.iter().all(|b| b.state == ArtifactBuildState::Planned));
    assert!(builds.iter().all(|b| b.build_arg("compose_id") == Some(&json!(1))));
    assert!(builds.iter().all(|b| b.build_arg("compose_repo").is_none()));
    assert_eq!(h.stats().handler_failures, 0);

    // The compose service reports the failure later.
    let (topic, body) = compose_state("odcs-1", 1, "failed");
    with_timeout(h.send(&topic, body)).await?;

    assert!(
        h.builds_for("sign-1")
            .iter()
            .all(|b| b.state == ArtifactBuildState::Failed)
    );
    Ok(())
}

#[tokio::test]
async fn build_outside_candidate_tag_keeps_plan_unprepared() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let inventory = InventoryBuilder::new()
        .advisory(1, "RHSA-2020-0001", "QE", &[NVR], true, &["repo-1"])
        .content_sets("repo-1", &["cs1"])
        .package(NVR, "bash", &["bash"], None)
        .image(image("X-1-1", None, &["cs1"], &["bash"]))
        .build();
    let mut h = TestHarness::new(&cfg, inventory);

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    let builds = h.builds_for("sign-1");
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].state, ArtifactBuildState::Planned);
    assert!(builds[0].build_arg("compose_id").is_none());
    assert!(h.memory.requested_composes().is_empty());
    Ok(())
}

#[tokio::test]
async fn unsigned_advisory_produces_no_plan() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let inventory = InventoryBuilder::new()
        .advisory(1, "RHSA-2020-0001", "QE", &[NVR, "zsh-5.7-1.fc30"], false, &["repo-1"])
        .content_sets("repo-1", &["cs1"])
        .package(NVR, "bash", &["bash"], Some("f30-candidate"))
        .image(image("X-1-1", None, &["cs1"], &["bash"]))
        .build();
    let mut h = TestHarness::new(&cfg, inventory);

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    assert!(h.builds_for("sign-1").is_empty());
    assert!(h.memory.requested_composes().is_empty());
    assert_eq!(h.stats().handler_failures, 0);
    Ok(())
}

#[tokio::test]
async fn child_of_denied_parent_is_promoted() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .whitelist("global", "image", Rule::leaf("image_nvr", RuleValue::pattern("Y-.*")?))
        .build();
    let mut h = TestHarness::new(&cfg, bash_inventory().build());

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;

    assert_eq!(h.batches_for("sign-1"), vec![vec!["Y-1-1"]]);
    assert_eq!(h.builds_for("sign-1")[0].depends_on, None);
    Ok(())
}

#[tokio::test]
async fn unknown_build_is_a_handler_failure_not_a_crash() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let inventory = InventoryBuilder::new()
        .advisory(1, "RHSA-2020-0001", "QE", &["ghost-1-1"], true, &["repo-1"])
        .content_sets("repo-1", &["cs1"])
        .build();
    let mut h = TestHarness::new(&cfg, inventory);

    let (topic, body) = rpm_signed("sign-1", "ghost-1-1");
    with_timeout(h.send(&topic, body)).await?;

    let stats = h.stats();
    assert_eq!(stats.handled_total, 1);
    assert_eq!(stats.handler_failures, 1);
    assert!(h.builds_for("sign-1").is_empty());
    Ok(())
}
