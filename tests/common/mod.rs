#![allow(dead_code)]

pub use rebuildd_test_utils::builders;
pub use rebuildd_test_utils::{TestHarness, init_tracing, with_timeout};

use serde_json::{Value, json};

pub const PREFIX: &str = "org.fedoraproject.prod";

pub fn topic(suffix: &str) -> String {
    format!("{PREFIX}.{suffix}")
}

pub fn rpm_signed(msg_id: &str, nvr: &str) -> (String, Value) {
    (
        topic("brew.sign.rpm"),
        json!({ "msg_id": msg_id, "msg": { "build": { "nvr": nvr } } }),
    )
}

pub fn advisory_status(msg_id: &str, id: u64, name: &str, state: &str) -> (String, Value) {
    (
        topic("errata.activity.status"),
        json!({ "msg_id": msg_id, "msg": { "errata_id": id, "fulladvisory": name, "to": state } }),
    )
}

pub fn module_state(msg_id: &str, id: u64, name: &str, stream: &str, state: &str) -> (String, Value) {
    (
        topic("mbs.module.state.change"),
        json!({
            "msg_id": msg_id,
            "msg": { "id": id, "name": name, "stream": stream, "state_name": state }
        }),
    )
}

pub fn compose_state(msg_id: &str, id: u64, state: &str) -> (String, Value) {
    (
        topic("odcs.compose.state-changed"),
        json!({ "msg_id": msg_id, "msg": { "compose": { "id": id, "state_name": state } } }),
    )
}
