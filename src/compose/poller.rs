// src/compose/poller.rs

//! Bounded polling of one compose job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::compose::ComposeState;
use crate::errors::{RebuildError, Result};
use crate::services::ComposeService;

/// Drives a compose from submission to `DONE`/`FAILED`.
///
/// The loop sleeps `poll_interval` between status fetches and is bounded by
/// `timeout` overall. Shutdown is observed through a `watch` channel.
#[derive(Clone)]
pub struct ComposePoller {
    service: Arc<dyn ComposeService>,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for ComposePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposePoller")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Handle on a submitted compose, returned even when polling fails so the
/// caller can record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeTicket {
    pub compose_id: u64,
    pub compose_url: String,
}

impl ComposePoller {
    pub fn new(service: Arc<dyn ComposeService>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            service,
            poll_interval,
            timeout,
        }
    }

    /// Submit a compose of `packages` from `source` and wait for it.
    ///
    /// Returns the result repository URL. Errors:
    /// - `ComposeFailed` when the job reports failure,
    /// - `ComposeProtocol` on an unknown status code,
    /// - `PollTimeout` when the deadline passes first,
    /// - `Cancelled` when shutdown is signalled.
    pub async fn prepare(
        &self,
        source: &str,
        packages: &[String],
        shutdown: watch::Receiver<bool>,
    ) -> Result<String> {
        let ticket = self.submit(source, packages).await?;
        self.wait(&ticket, shutdown).await
    }

    pub async fn submit(&self, source: &str, packages: &[String]) -> Result<ComposeTicket> {
        let compose_id = self.service.new_compose(source, packages).await?;
        let compose_url = self.service.compose_url(compose_id);
        info!(compose_id, %compose_url, source, ?packages, "compose requested");
        Ok(ComposeTicket {
            compose_id,
            compose_url,
        })
    }

    /// Poll an already-submitted compose until it settles.
    pub async fn wait(
        &self,
        ticket: &ComposeTicket,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<String> {
        let polling = self.poll_until_terminal(ticket);
        let bounded = tokio::time::timeout(self.timeout, polling);

        tokio::select! {
            outcome = bounded => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        compose_id = ticket.compose_id,
                        compose_url = %ticket.compose_url,
                        waited = ?self.timeout,
                        "compose did not finish in time"
                    );
                    Err(RebuildError::PollTimeout {
                        compose_url: ticket.compose_url.clone(),
                        waited: self.timeout,
                    })
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => {
                info!(compose_id = ticket.compose_id, "compose polling cancelled by shutdown");
                Err(RebuildError::Cancelled)
            }
        }
    }

    async fn poll_until_terminal(&self, ticket: &ComposeTicket) -> Result<String> {
        let compose_id = ticket.compose_id;
        let mut state = ComposeState::Requested;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let status = self.service.get_compose(compose_id).await?;
            let next = ComposeState::from_code(compose_id, status.state).inspect_err(|_| {
                error!(compose_id, code = status.state, "unexpected compose state code");
            })?;

            if next != state {
                info!(compose_id, from = %state, to = %next, "compose state changed");
                state = next;
            }

            match state {
                ComposeState::Done => {
                    return status.result_repo.ok_or_else(|| {
                        RebuildError::external(
                            "compose",
                            format!("compose {compose_id} is done but has no result repository"),
                        )
                    });
                }
                ComposeState::Failed => {
                    error!(compose_url = %ticket.compose_url, "compose failed; consult the compose service");
                    return Err(RebuildError::ComposeFailed {
                        compose_url: ticket.compose_url.clone(),
                    });
                }
                _ => {}
            }
        }
    }
}

/// Resolves once `true` is published, or never if the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
