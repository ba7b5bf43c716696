// tests/parser_registry.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, InventoryBuilder};
use crate::common::{TestHarness, init_tracing, topic, with_timeout};

use std::error::Error;

use serde_json::json;

use rebuildd::events::EventKind;
use rebuildd::events::parsers::{ParserSettings, build_registry, builtin_parser_keys};

type TestResult = Result<(), Box<dyn Error>>;

fn all_parsers() -> Vec<String> {
    builtin_parser_keys().into_iter().map(str::to_string).collect()
}

#[test]
fn module_push_is_classified_with_derived_scm_url() -> TestResult {
    init_tracing();

    let settings = ParserSettings {
        git_base_url: "git://pkgs.fedoraproject.org".to_string(),
    };
    let registry = build_registry(vec!["org.fedoraproject.prod".into()], &all_parsers(), &settings)?;

    let payload = json!({
        "msg": { "commit": { "namespace": "modules", "repo": "foo", "branch": "master", "rev": "abc123" } }
    });
    let event = registry
        .classify("org.fedoraproject.prod.git.receive", &payload)
        .expect("module push is recognised");

    match event.kind() {
        EventKind::ModuleMetadataUpdated { scm_url, branch } => {
            assert!(scm_url.ends_with("foo.git?#abc123"), "unexpected url {scm_url}");
            assert_eq!(branch, "master");
        }
        other => panic!("expected module metadata update, got {other:?}"),
    }

    // Classification is a function of its input, apart from generated ids.
    let again = registry
        .classify("org.fedoraproject.prod.git.receive", &payload)
        .expect("module push is recognised");
    assert_eq!(again.kind(), event.kind());
    assert_ne!(again.msg_id(), event.msg_id());
    Ok(())
}

#[test]
fn subscription_set_crosses_prefixes_with_suffixes() -> TestResult {
    let registry = build_registry(
        vec!["org.fedoraproject.prod".into(), "org.fedoraproject.stg".into()],
        &["brew_sign_rpm".to_string(), "odcs_compose".to_string()],
        &ParserSettings::default(),
    )?;

    assert_eq!(
        registry.topics(),
        vec![
            "org.fedoraproject.prod.brew.sign.rpm",
            "org.fedoraproject.prod.odcs.compose.state-changed",
            "org.fedoraproject.stg.brew.sign.rpm",
            "org.fedoraproject.stg.odcs.compose.state-changed",
        ]
    );
    Ok(())
}

#[test]
fn malformed_payload_is_dropped() -> TestResult {
    init_tracing();

    let registry = build_registry(
        vec!["org.fedoraproject.prod".into()],
        &all_parsers(),
        &ParserSettings::default(),
    )?;

    // `errata_id` missing.
    let payload = json!({ "msg": { "fulladvisory": "RHSA-2020-0001", "to": "QE" } });
    assert!(
        registry
            .classify("org.fedoraproject.prod.errata.activity.status", &payload)
            .is_none()
    );
    // No `msg` envelope at all.
    assert!(
        registry
            .classify("org.fedoraproject.prod.brew.sign.rpm", &json!({ "build": {} }))
            .is_none()
    );
    Ok(())
}

#[test]
fn unknown_parser_key_is_a_config_error() {
    let err = build_registry(
        vec!["p".into()],
        &["koji_tag".to_string()],
        &ParserSettings::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("koji_tag"));
}

#[tokio::test]
async fn dockerfile_push_is_recorded_without_planning() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new().build();
    let mut h = TestHarness::new(&cfg, InventoryBuilder::new().build());

    let body = json!({
        "msg_id": "git-1",
        "msg": { "commit": {
            "namespace": "container", "repo": "base", "branch": "f30", "rev": "d0c",
            "stats": { "files": { "Dockerfile": { "additions": 2 } } }
        } }
    });
    with_timeout(h.send(&topic("git.receive"), body)).await?;

    let event = h.store.event("git-1")?.ok_or("event not recorded")?;
    assert!(matches!(event.kind(), EventKind::DockerfileChanged { .. }));
    assert!(h.builds_for("git-1").is_empty());

    let stats = h.stats();
    assert_eq!(stats.received_passed, 1);
    assert_eq!(stats.handled_total, 0);
    assert_eq!(stats.handler_failures, 0);
    Ok(())
}
