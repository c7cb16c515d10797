//! Narrated progress: a time-boxed stage sequence played while the real
//! request is in flight.
//!
//! The conversion API gives no progress events — the request is opaque until
//! it resolves. The user still needs continuous feedback, so each tool ships
//! a short script of `(percent, label, delay)` steps that a [`Narrator`]
//! plays back on real timers, publishing snapshots through a watch channel.
//!
//! Two tasks, joined only at completion: the cosmetic ticker here and the
//! real request in [`crate::pipeline::submit`]. The narration never reaches
//! 100 on its own — scripts top out below it, and only the flow, holding the
//! real response, calls [`Narrator::complete`] (or [`Narrator::halt`] on
//! failure, freezing the bar where it was). Reaching the last scripted step
//! therefore never implies the job is done, and the page transition always
//! waits on the real response.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// One scripted stage: the percentage and label to show, and how long to
/// hold them before the next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStep {
    pub percent: u8,
    pub label: String,
    pub delay_ms: u64,
}

/// A tool's full narration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressScript {
    /// Label shown at 0%, before the first step fires.
    pub opening_label: String,
    pub steps: Vec<ProgressStep>,
}

impl ProgressScript {
    pub fn new(opening_label: impl Into<String>, steps: Vec<ProgressStep>) -> Self {
        ProgressScript {
            opening_label: opening_label.into(),
            steps,
        }
    }
}

/// What an observer sees at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Always within [0, 100]; non-decreasing over a playback.
    pub percent: u8,
    pub label: String,
    /// True once the real outcome is known — the bar will not move again.
    pub settled: bool,
}

/// Receives snapshots as the narration (and the real outcome) unfolds.
///
/// Inject one via [`crate::flow::ToolFlow::progress_observer`] to drive a
/// progress bar, a WebSocket, or a log line — the pipeline knows nothing
/// about how the host renders progress. Implementations must be
/// `Send + Sync`; updates arrive from a forwarding task.
pub trait ProgressObserver: Send + Sync {
    fn on_update(&self, snapshot: &ProgressSnapshot);
}

/// The default observer: ignores everything.
pub struct NoopProgressObserver;

impl ProgressObserver for NoopProgressObserver {
    fn on_update(&self, _snapshot: &ProgressSnapshot) {}
}

/// Plays a [`ProgressScript`] on a background task.
///
/// Dropping the narrator cancels playback. The published percentage is
/// clamped non-decreasing and below 100 regardless of the script's contents,
/// so a malformed script cannot make the bar jump backwards or claim
/// completion.
pub struct Narrator {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
    ticker: JoinHandle<()>,
}

impl Narrator {
    /// Start playback immediately.
    pub fn start(script: ProgressScript) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot {
            percent: 0,
            label: script.opening_label.clone(),
            settled: false,
        });
        let tx = Arc::new(tx);

        let ticker_tx = Arc::clone(&tx);
        let ticker = tokio::spawn(async move {
            let mut floor = 0u8;
            for step in script.steps {
                // Clamp: never backwards, never claiming completion.
                let percent = step.percent.clamp(floor, 99);
                floor = percent;
                debug!(percent, label = %step.label, "narration step");
                ticker_tx.send_modify(|snap| {
                    if !snap.settled {
                        snap.percent = percent;
                        snap.label = step.label.clone();
                    }
                });
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
            }
        });

        Narrator { tx, ticker }
    }

    /// Observe playback. Multiple subscribers are fine.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// The real request succeeded: jump to 100 and settle.
    pub fn complete(self, label: impl Into<String>) {
        self.ticker.abort();
        let label = label.into();
        self.tx.send_modify(|snap| {
            snap.percent = 100;
            snap.label = label.clone();
            snap.settled = true;
        });
    }

    /// The real request failed: freeze the bar where it is and settle.
    /// The percentage stays below 100.
    pub fn halt(self) {
        self.ticker.abort();
        self.tx.send_modify(|snap| {
            snap.settled = true;
        });
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_script() -> ProgressScript {
        ProgressScript::new(
            "Preparing files...",
            vec![
                ProgressStep { percent: 15, label: "Uploading...".into(), delay_ms: 5 },
                ProgressStep { percent: 55, label: "Processing...".into(), delay_ms: 5 },
                ProgressStep { percent: 90, label: "Finalizing...".into(), delay_ms: 5 },
            ],
        )
    }

    /// Drain snapshots until the narration settles.
    async fn collect_until_settled(
        mut rx: watch::Receiver<ProgressSnapshot>,
    ) -> Vec<ProgressSnapshot> {
        let mut seen = vec![rx.borrow().clone()];
        loop {
            if rx.changed().await.is_err() {
                break;
            }
            let snap = rx.borrow().clone();
            let settled = snap.settled;
            seen.push(snap);
            if settled {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn narration_is_monotone_and_bounded() {
        let narrator = Narrator::start(quick_script());
        let rx = narrator.subscribe();
        let collector = tokio::spawn(collect_until_settled(rx));

        tokio::time::sleep(Duration::from_millis(40)).await;
        narrator.complete("Complete!");

        let seen = collector.await.expect("collector");
        assert!(seen.len() >= 2);
        let mut prev = 0u8;
        for snap in &seen {
            assert!(snap.percent <= 100);
            assert!(snap.percent >= prev, "sequence must be non-decreasing: {seen:?}");
            prev = snap.percent;
        }
        let last = seen.last().expect("at least one snapshot");
        assert_eq!(last.percent, 100);
        assert_eq!(last.label, "Complete!");
        assert!(last.settled);
    }

    #[tokio::test]
    async fn completion_before_playback_finishes_still_wins() {
        // Long delays: the real response lands before step two fires.
        let script = ProgressScript::new(
            "Preparing...",
            vec![
                ProgressStep { percent: 15, label: "Uploading...".into(), delay_ms: 10_000 },
                ProgressStep { percent: 90, label: "Finalizing...".into(), delay_ms: 10_000 },
            ],
        );
        let narrator = Narrator::start(script);
        let rx = narrator.subscribe();
        narrator.complete("Complete!");

        let snap = rx.borrow().clone();
        assert_eq!(snap.percent, 100);
        assert!(snap.settled);
    }

    #[tokio::test]
    async fn halt_freezes_below_one_hundred() {
        let narrator = Narrator::start(quick_script());
        let rx = narrator.subscribe();
        tokio::time::sleep(Duration::from_millis(8)).await;
        narrator.halt();

        let snap = rx.borrow().clone();
        assert!(snap.settled);
        assert!(snap.percent < 100, "failure must never show completion");
    }

    #[tokio::test]
    async fn malformed_script_is_clamped() {
        // Decreasing and >99 steps: the clamp keeps observers sane.
        let script = ProgressScript::new(
            "Preparing...",
            vec![
                ProgressStep { percent: 80, label: "a".into(), delay_ms: 2 },
                ProgressStep { percent: 40, label: "b".into(), delay_ms: 2 },
                ProgressStep { percent: 255, label: "c".into(), delay_ms: 2 },
            ],
        );
        let narrator = Narrator::start(script);
        let rx = narrator.subscribe();
        let collector = tokio::spawn(collect_until_settled(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        narrator.halt();

        let seen = collector.await.expect("collector");
        let mut prev = 0u8;
        for snap in &seen {
            assert!(snap.percent >= prev);
            assert!(snap.percent < 100);
            prev = snap.percent;
        }
    }
}
