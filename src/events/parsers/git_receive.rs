// src/events/parsers/git_receive.rs

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::events::parser::{field, msg_id_of, require_str};
use crate::events::{Event, EventKind, EventParser};

/// Pushes to dist-git.
///
/// - `modules/*`: module metadata changed.
/// - `rpms/*` touching a `.spec` file: package spec changed.
/// - `container/*` or `docker/*` touching `Dockerfile`: image recipe changed.
///   No built-in handler acts on this yet; the event is only recorded, so
///   later events can find it by search key.
#[derive(Debug, Clone)]
pub struct GitReceiveParser {
    git_base_url: String,
}

impl GitReceiveParser {
    pub fn new(git_base_url: &str) -> Self {
        Self {
            git_base_url: git_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl EventParser for GitReceiveParser {
    fn name(&self) -> &'static str {
        "git_receive"
    }

    fn topic_suffixes(&self) -> &'static [&'static str] {
        &["git.receive"]
    }

    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>> {
        let Some(commit) = field(payload, &["msg", "commit"]) else {
            debug!(topic, "skipping git message without commit");
            return Ok(None);
        };

        let namespace = require_str(topic, commit, &["namespace"])?;
        let repo = require_str(topic, commit, &["repo"])?;
        let branch = require_str(topic, commit, &["branch"])?;
        let rev = require_str(topic, commit, &["rev"])?;

        let changed = changed_files(commit);
        let base = &self.git_base_url;

        let kind = match namespace.as_str() {
            "modules" => EventKind::ModuleMetadataUpdated {
                scm_url: format!("{base}/modules/{repo}.git?#{rev}"),
                branch,
            },
            "rpms" if changed.iter().any(|f| f.ends_with(".spec")) => EventKind::RpmSpecUpdated {
                rpm: repo,
                branch,
                rev,
            },
            "container" | "docker" if changed.iter().any(|f| is_dockerfile(f)) => {
                EventKind::DockerfileChanged {
                    repo_url: format!("{base}/{namespace}/{repo}"),
                    namespace,
                    repo,
                    branch,
                    rev,
                }
            }
            _ => {
                debug!(topic, %namespace, %repo, "git push is not relevant");
                return Ok(None);
            }
        };

        Ok(Some(Event::new(msg_id_of(payload), kind)))
    }
}

fn changed_files(commit: &Value) -> Vec<&str> {
    field(commit, &["stats", "files"])
        .and_then(Value::as_object)
        .map(|files| files.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn is_dockerfile(path: &str) -> bool {
    path.rsplit('/').next() == Some("Dockerfile")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOPIC: &str = "org.fedoraproject.prod.git.receive";

    fn parser() -> GitReceiveParser {
        GitReceiveParser::new("git://pkgs.fedoraproject.org/")
    }

    #[test]
    fn module_push_derives_scm_url() {
        let payload = json!({
            "msg_id": "2017-1",
            "msg": { "commit": { "namespace": "modules", "repo": "foo", "branch": "master", "rev": "abc123" } }
        });
        let event = parser().parse(TOPIC, &payload).unwrap().unwrap();
        assert_eq!(event.msg_id(), "2017-1");
        assert_eq!(
            event.kind(),
            &EventKind::ModuleMetadataUpdated {
                scm_url: "git://pkgs.fedoraproject.org/modules/foo.git?#abc123".into(),
                branch: "master".into(),
            }
        );
    }

    #[test]
    fn spec_change_in_rpms_namespace() {
        let payload = json!({
            "msg": { "commit": {
                "namespace": "rpms", "repo": "bash", "branch": "f30", "rev": "r1",
                "stats": { "files": { "bash.spec": {}, "sources": {} } }
            } }
        });
        let event = parser().parse(TOPIC, &payload).unwrap().unwrap();
        assert_eq!(event.kind().name(), "rpm_spec_updated");
        assert_eq!(event.search_key(), "bash#r1");
    }

    #[test]
    fn rpms_push_without_spec_change_is_ignored() {
        let payload = json!({
            "msg": { "commit": {
                "namespace": "rpms", "repo": "bash", "branch": "f30", "rev": "r1",
                "stats": { "files": { "sources": {} } }
            } }
        });
        assert!(parser().parse(TOPIC, &payload).unwrap().is_none());
    }

    #[test]
    fn dockerfile_change_in_container_namespace() {
        let payload = json!({
            "msg": { "commit": {
                "namespace": "container", "repo": "testimage", "branch": "master", "rev": "c1",
                "stats": { "files": { "Dockerfile": {} } }
            } }
        });
        let event = parser().parse(TOPIC, &payload).unwrap().unwrap();
        match event.kind() {
            EventKind::DockerfileChanged { repo_url, .. } => {
                assert_eq!(repo_url, "git://pkgs.fedoraproject.org/container/testimage");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_commit_is_irrelevant_and_missing_field_is_malformed() {
        assert!(parser().parse(TOPIC, &json!({ "msg": {} })).unwrap().is_none());
        let payload = json!({ "msg": { "commit": { "namespace": "modules" } } });
        assert!(parser().parse(TOPIC, &payload).is_err());
    }
}
