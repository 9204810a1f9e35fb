//! Reloading metadata from the repository directory.
//!
//! Reloads are triggered by SIGHUP and, when configured, on a fixed
//! interval. A failed reload is logged and leaves the current snapshot in
//! force.

use std::future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tuf_gate::{AuthorizationService, ReloadReport};

use crate::repository;

/// Read `directory` and hand its documents to `service`.
pub fn reload_from(
    service: &AuthorizationService,
    directory: &Path,
) -> anyhow::Result<ReloadReport> {
    let bundle = repository::load(directory)?;
    service
        .reload(&bundle)
        .with_context(|| format!("failed to reload {}", directory.display()))
}

/// Spawn the task that reloads `service` from `directory` on every trigger.
pub fn spawn(
    service: Arc<AuthorizationService>,
    directory: PathBuf,
    every: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut hangup = Hangup::install();
        let mut ticker = every.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            let trigger = tokio::select! {
                _ = hangup.recv() => "signal",
                _ = tick(&mut ticker) => "interval",
            };

            let service = service.clone();
            let directory = directory.clone();
            match tokio::task::spawn_blocking(move || reload_from(&service, &directory)).await {
                Ok(Ok(report)) => {
                    tracing::debug!(trigger, skipped = report.skipped.len(), "reload finished")
                }
                Ok(Err(error)) => tracing::warn!(trigger, "{error:#}"),
                Err(error) => tracing::error!(trigger, %error, "reload task failed"),
            }
        }
    })
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(unix)]
struct Hangup(Option<tokio::signal::unix::Signal>);

#[cfg(unix)]
impl Hangup {
    fn install() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::hangup()) {
            Ok(signal) => Self(Some(signal)),
            Err(error) => {
                tracing::warn!(%error, "SIGHUP reloads are unavailable");
                Self(None)
            }
        }
    }

    async fn recv(&mut self) {
        if let Some(signal) = &mut self.0
            && signal.recv().await.is_some()
        {
            return;
        }
        future::pending().await
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn install() -> Self {
        Self
    }

    async fn recv(&mut self) {
        future::pending().await
    }
}
