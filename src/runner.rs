// Runs timeframes in parallel and fans their results into the sinks

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::error::TimeframeError;
use crate::input::Timeframe;
use crate::output::ResultSink;
use crate::pipeline::{ClusterResult, Pipeline, TimeframeSummary};

/// Where a timeframe comes from.
#[derive(Debug, Clone)]
pub enum TimeframeSource {
    File(PathBuf),
    Generated(Timeframe),
}

impl TimeframeSource {
    fn label(&self) -> String {
        match self {
            TimeframeSource::File(path) => path.display().to_string(),
            TimeframeSource::Generated(tf) => format!("generated timeframe {}", tf.timeframe),
        }
    }

    fn load(self) -> Result<Timeframe, TimeframeError> {
        match self {
            TimeframeSource::File(path) => Ok(Timeframe::load(&path)?),
            TimeframeSource::Generated(tf) => Ok(tf),
        }
    }
}

enum RunEvent {
    Cluster(ClusterResult),
    Timeframe(TimeframeSummary),
}

impl RunEvent {
    fn kind(&self) -> &'static str {
        match self {
            RunEvent::Cluster(_) => "cluster result",
            RunEvent::Timeframe(_) => "timeframe summary",
        }
    }
}

/// Blocking send to the sink task. Returns false, with a warning, once the
/// channel is closed.
fn deliver(tx: &mpsc::Sender<RunEvent>, event: RunEvent, label: &str) -> bool {
    let kind = event.kind();
    if tx.blocking_send(event).is_err() {
        warn!("result channel closed, {} of {} not delivered", kind, label);
        return false;
    }
    true
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub processed: usize,
    pub failed: usize,
    pub summaries: Vec<TimeframeSummary>,
}

/// Process every source, at most `max_parallel` timeframes at a time.
///
/// Each timeframe runs on a blocking thread; results reach the sinks through
/// a single task, so sinks need no locking. A failing timeframe is logged and
/// counted without stopping the others.
pub async fn run(
    pipeline: Arc<Pipeline>,
    sources: Vec<TimeframeSource>,
    sinks: Vec<Box<dyn ResultSink>>,
    max_parallel: usize,
    abort: Arc<AtomicBool>,
) -> RunReport {
    let (tx, mut rx) = mpsc::channel::<RunEvent>(1024);

    let sink_task = tokio::spawn(async move {
        let mut sinks = sinks;
        while let Some(event) = rx.recv().await {
            for sink in sinks.iter_mut() {
                match &event {
                    RunEvent::Cluster(result) => sink.handle_cluster(result),
                    RunEvent::Timeframe(summary) => sink.handle_summary(summary),
                }
            }
        }
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.finish() {
                error!("Failed to finish output: {}", e);
            }
        }
    });

    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(sources.len());
    for source in sources {
        let permit = match permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let pipeline = pipeline.clone();
        let abort = abort.clone();
        let tx = tx.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let label = source.label();
            let result = source.load().and_then(|tf| {
                pipeline.process(tf, &abort, |r| {
                    deliver(&tx, RunEvent::Cluster(r), &label);
                })
            });
            if let Ok(summary) = &result {
                deliver(&tx, RunEvent::Timeframe(summary.clone()), &label);
            }
            (label, result)
        }));
    }
    drop(tx);

    let mut report = RunReport::default();
    for handle in handles {
        match handle.await {
            Ok((_, Ok(summary))) => {
                report.processed += 1;
                report.summaries.push(summary);
            }
            Ok((label, Err(e))) => {
                error!("Timeframe {} failed: {}", label, e);
                report.failed += 1;
            }
            Err(e) => {
                error!("Timeframe task panicked: {}", e);
                report.failed += 1;
            }
        }
    }

    if let Err(e) = sink_task.await {
        error!("Output task failed: {}", e);
    }
    info!(
        "Run finished: {} timeframes processed, {} failed",
        report.processed, report.failed
    );
    report
}
