// tests/advisory_flow.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, InventoryBuilder, image};
use crate::common::{TestHarness, advisory_status, init_tracing, rpm_signed, with_timeout};

use std::error::Error;

use rebuildd::rules::{Rule, RuleValue};
use rebuildd::store::BuildFilter;
use rebuildd::types::{ArtifactBuildState, ArtifactType};

type TestResult = Result<(), Box<dyn Error>>;

const NVR: &str = "bash-4.4-1.fc30";

fn inventory(all_signed: bool) -> InventoryBuilder {
    InventoryBuilder::new()
        .advisory(7, "RHSA-2020-0001", "QE", &[NVR], all_signed, &["repo-1"])
        .content_sets("repo-1", &["cs1"])
        .package(NVR, "bash", &["bash"], None)
        .image(image("X-1-1", None, &["cs1"], &["bash"]))
        .image(image("Y-1-1", Some("X-1-1"), &["cs1"], &["bash"]))
}

#[tokio::test]
async fn signed_advisory_chains_into_image_plan() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, inventory(true).build());

    let (topic, body) = advisory_status("errata-1", 7, "RHSA-2020-0001", "QE");
    with_timeout(h.send(&topic, body)).await?;

    let stats = h.stats();
    assert_eq!(stats.received_total, 1);
    assert_eq!(stats.received_passed, 1);
    assert_eq!(stats.follow_ups, 1);
    // update_db_on_advisory_change, then rebuild_images_on_advisory_signed
    // for the follow-up.
    assert_eq!(stats.handled_total, 2);
    assert_eq!(stats.handler_failures, 0);

    // The plan hangs off the synthetic follow-up event, not the inbound one.
    assert!(h.builds_for("errata-1").is_empty());
    let images = h
        .store
        .find_builds(&BuildFilter::new().artifact_type(ArtifactType::Image))?;
    let mut names: Vec<&str> = images.iter().map(|b| b.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["X-1-1", "Y-1-1"]);
    assert!(images.iter().all(|b| b.event_id.starts_with("local-")));
    assert!(images.iter().all(|b| b.state == ArtifactBuildState::Planned));
    Ok(())
}

#[tokio::test]
async fn unsigned_advisory_emits_nothing() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, inventory(false).build());

    let (topic, body) = advisory_status("errata-1", 7, "RHSA-2020-0001", "QE");
    with_timeout(h.send(&topic, body)).await?;

    assert_eq!(h.stats().follow_ups, 0);
    assert!(h.store.find_builds(&BuildFilter::new())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn advisory_denied_by_handler_whitelist_emits_nothing() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .whitelist(
            "update_db_on_advisory_change",
            "image",
            Rule::leaf("advisory_name", RuleValue::pattern("RHBA-.*")?),
        )
        .build();
    let mut h = TestHarness::new(&cfg, inventory(true).build());

    let (topic, body) = advisory_status("errata-1", 7, "RHSA-2020-0001", "QE");
    with_timeout(h.send(&topic, body)).await?;

    assert_eq!(h.stats().follow_ups, 0);
    Ok(())
}

#[tokio::test]
async fn shipped_advisory_marks_earlier_events_released_once() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, inventory(true).build());

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body)).await?;
    assert!(!h.store.event("sign-1")?.expect("event recorded").released());

    let (topic, body) = advisory_status("errata-1", 7, "RHSA-2020-0001", "SHIPPED_LIVE");
    with_timeout(h.send(&topic, body)).await?;
    assert!(h.store.event("sign-1")?.expect("event recorded").released());

    // A second shipped notification is harmless.
    let (topic, body) = advisory_status("errata-2", 7, "RHSA-2020-0001", "SHIPPED_LIVE");
    with_timeout(h.send(&topic, body)).await?;

    let stats = h.stats();
    assert_eq!(stats.handler_failures, 0);
    assert_eq!(stats.follow_ups, 0);
    Ok(())
}

#[tokio::test]
async fn redelivered_message_is_processed_once() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, inventory(true).build());

    let (topic, body) = rpm_signed("sign-1", NVR);
    with_timeout(h.send(&topic, body.clone())).await?;
    with_timeout(h.send(&topic, body)).await?;

    assert_eq!(h.builds_for("sign-1").len(), 2);
    let stats = h.stats();
    assert_eq!(stats.received_total, 2);
    assert_eq!(stats.received_passed, 2);
    assert_eq!(stats.handled_total, 1);
    Ok(())
}

#[tokio::test]
async fn unrecognised_messages_are_counted_and_dropped() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, inventory(true).build());

    with_timeout(h.send("org.fedoraproject.prod.bodhi.update", serde_json::json!({}))).await?;
    // Recognised topic, irrelevant payload.
    with_timeout(h.send(
        "org.fedoraproject.prod.git.receive",
        serde_json::json!({ "msg": { "commit": {
            "namespace": "tests", "repo": "x", "branch": "master", "rev": "1"
        } } }),
    ))
    .await?;

    let stats = h.stats();
    assert_eq!(stats.received_total, 2);
    assert_eq!(stats.received_ignored, 2);
    assert_eq!(stats.handled_total, 0);
    Ok(())
}
