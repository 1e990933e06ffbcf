use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use mirror_core::MirrorConfig;
use mirror_sync::{
    prepare_replica, run_once, CancelFlag, PassOptions, PassSummary, SyncError, SyncPassResult,
    TracingSink,
};

use crate::error::{io_err, DaemonError};
use crate::logging::{self, LogOptions};

/// What the scheduler did before it stopped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerReport {
    /// Passes attempted, including failed ones.
    pub passes: u64,
    /// Passes that failed outright or recorded item errors.
    pub failed_passes: u64,
    /// Summary of the last pass that ran to a result.
    pub last: Option<PassSummary>,
}

/// Build a runtime, install logging and run the scheduler until ctrl-c or
/// `max_passes`. Blocks the current thread.
pub fn start_blocking(
    config: MirrorConfig,
    log: LogOptions,
) -> Result<SchedulerReport, DaemonError> {
    config.validate()?;
    logging::init(&log)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);

        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, stopping after the current item");
                        let _ = shutdown.send(());
                    }
                    Err(err) => tracing::warn!(error = %err, "ctrl-c handler unavailable"),
                }
            })
        };

        let report = run(config, shutdown_rx).await;
        signal_handle.abort();
        report
    })
}

/// Run a pass every `config.interval` until `shutdown` fires.
///
/// The first pass starts immediately. A shutdown received mid-pass cancels
/// it before the next item. Pass failures, including a missing root, are
/// logged and the loop keeps going.
pub async fn run(
    config: MirrorConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<SchedulerReport, DaemonError> {
    let period = config.interval.as_duration();
    schedule(config, period, shutdown).await
}

async fn schedule(
    config: MirrorConfig,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<SchedulerReport, DaemonError> {
    let mut report = SchedulerReport::default();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        source = %config.source.display(),
        replica = %config.replica.display(),
        interval = %config.interval,
        compare = %config.compare,
        dry_run = config.dry_run,
        "mirror scheduler started",
    );

    let mut stopping = false;
    while !stopping {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let cancel = CancelFlag::new();
        let job = {
            let config = config.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || run_pass(&config, cancel))
        };
        tokio::pin!(job);

        let joined = tokio::select! {
            biased;
            joined = &mut job => joined,
            _ = shutdown_rx.recv() => {
                cancel.cancel();
                stopping = true;
                job.await
            }
        };
        let outcome = joined.map_err(|err| DaemonError::Task {
            task: "sync pass",
            message: err.to_string(),
        })?;

        report.passes += 1;
        record_outcome(&mut report, outcome);

        if config.max_passes.is_some_and(|max| report.passes >= max) {
            tracing::info!(passes = report.passes, "pass limit reached");
            break;
        }
    }

    tracing::info!(
        passes = report.passes,
        failed = report.failed_passes,
        "mirror scheduler stopped",
    );
    Ok(report)
}

fn record_outcome(report: &mut SchedulerReport, outcome: Result<SyncPassResult, SyncError>) {
    match outcome {
        Ok(result) => {
            let summary = result.summary();
            if !result.is_success() {
                report.failed_passes += 1;
            }
            tracing::info!(
                created = summary.created,
                updated = summary.updated,
                deleted = summary.deleted,
                errors = summary.errors.len(),
                duration_ms = summary.duration_ms as u64,
                cancelled = summary.cancelled,
                dry_run = summary.dry_run,
                "pass complete",
            );
            report.last = Some(summary);
        }
        Err(err) => {
            report.failed_passes += 1;
            if err.is_fatal() {
                tracing::warn!(error = %err, "pass skipped, will retry next tick");
            } else {
                tracing::error!(error = %err, "pass failed");
            }
        }
    }
}

/// One pass for `config`, creating the replica root first unless dry-running.
pub fn run_pass(config: &MirrorConfig, cancel: CancelFlag) -> Result<SyncPassResult, SyncError> {
    if !config.dry_run {
        prepare_replica(&config.replica)?;
    }
    let options = PassOptions {
        compare: config.compare,
        dry_run: config.dry_run,
        cancel,
    };
    run_once(&config.source, &config.replica, &options, &mut TracingSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TICK: Duration = Duration::from_millis(20);

    fn job(tmp: &TempDir) -> MirrorConfig {
        let source = tmp.path().join("source");
        fs::create_dir_all(source.join("dir")).unwrap();
        fs::write(source.join("a.txt"), b"0123456789").unwrap();
        fs::write(source.join("dir").join("b.txt"), b"hello").unwrap();
        MirrorConfig::new(source, tmp.path().join("replica"))
    }

    #[tokio::test]
    async fn shutdown_before_first_tick_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = job(&tmp);
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let report = schedule(config.clone(), TICK, rx).await.unwrap();
        assert_eq!(report.passes, 0);
        assert!(report.last.is_none());
        assert!(!config.replica.exists());
    }

    #[test]
    fn run_honours_shutdown_sent_before_start() {
        let tmp = TempDir::new().unwrap();
        let config = job(&tmp);
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let report = tokio_test::block_on(run(config, rx)).unwrap();
        assert_eq!(report.passes, 0);
        assert_eq!(report.failed_passes, 0);
    }

    #[tokio::test]
    async fn bounded_run_converges_then_idles() {
        let tmp = TempDir::new().unwrap();
        let mut config = job(&tmp);
        config.max_passes = Some(2);
        let (_tx, rx) = broadcast::channel(1);

        let report = schedule(config.clone(), TICK, rx).await.unwrap();
        assert_eq!(report.passes, 2);
        assert_eq!(report.failed_passes, 0);
        let last = report.last.expect("second pass summary");
        assert_eq!((last.created, last.updated, last.deleted), (0, 0, 0));
        assert_eq!(
            fs::read(config.replica.join("dir").join("b.txt")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn missing_source_fails_each_pass_but_loop_continues() {
        let tmp = TempDir::new().unwrap();
        let mut config = MirrorConfig::new(tmp.path().join("absent"), tmp.path().join("replica"));
        config.max_passes = Some(3);
        let (_tx, rx) = broadcast::channel(1);

        let report = schedule(config, TICK, rx).await.unwrap();
        assert_eq!(report.passes, 3);
        assert_eq!(report.failed_passes, 3);
        assert!(report.last.is_none());
    }

    #[tokio::test]
    async fn shutdown_after_first_pass_stops_loop() {
        let tmp = TempDir::new().unwrap();
        let config = job(&tmp);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(schedule(config.clone(), Duration::from_secs(3600), rx));
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(()).unwrap();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.passes, 1);
        assert!(config.replica.join("a.txt").is_file());
    }

    #[test]
    fn dry_run_pass_does_not_create_replica() {
        let tmp = TempDir::new().unwrap();
        let mut config = job(&tmp);
        config.dry_run = true;

        let err = run_pass(&config, CancelFlag::new()).unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert!(!config.replica.exists());
    }

    #[test]
    fn pass_creates_missing_replica_root() {
        let tmp = TempDir::new().unwrap();
        let config = job(&tmp);

        let result = run_pass(&config, CancelFlag::new()).unwrap();
        assert_eq!(result.created, 3);
        assert!(result.is_success());
    }
}
