//! The merge-debounce-publish loop.
//!
//! One task per [`EdgeSource`] pumps transitions into a single channel; the
//! watcher applies the shared [`Debouncer`] and publishes each accepted
//! trigger to the [`LapSink`] before looking at the next transition, so the
//! sink sees laps in detection order.

use std::sync::Arc;

use lapgate_core::{LapCounter, LapEvent, LapSink, SensorError};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::source::{EdgeSource, Transition};

/// Buffer between the per-source pump tasks and the watcher loop.
const MERGE_BUFFER: usize = 64;

/// Watches every configured channel and emits debounced lap events.
pub struct SensorWatcher {
    debouncer: Debouncer,
    counter: Arc<LapCounter>,
    sink: Arc<dyn LapSink>,
}

impl SensorWatcher {
    /// Create a watcher publishing into `sink`.
    #[must_use]
    pub fn new(debouncer: Debouncer, counter: Arc<LapCounter>, sink: Arc<dyn LapSink>) -> Self {
        Self {
            debouncer,
            counter,
            sink,
        }
    }

    /// Run until cancellation or until every source is exhausted.
    ///
    /// A failing source is logged and retired; the remaining channels keep
    /// triggering. Loss of *all* sources ends the run — the caller decides
    /// whether that is fatal.
    pub async fn run(self, sources: Vec<Box<dyn EdgeSource>>, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::channel::<Result<Transition, SensorError>>(MERGE_BUFFER);

        for source in sources {
            let tx = tx.clone();
            let cancel = cancel.clone();
            drop(tokio::spawn(pump_source(source, tx, cancel)));
        }
        drop(tx);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("sensor watcher cancelled");
                    break;
                }
                item = rx.recv() => match item {
                    Some(Ok(transition)) => self.handle(transition).await,
                    Some(Err(err)) => {
                        counter!("sensor_source_errors_total").increment(1);
                        warn!(error = %err, "sensor source failed, channel retired");
                    }
                    None => {
                        warn!("all sensor sources exhausted, watcher stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&self, transition: Transition) {
        if self.debouncer.try_accept() {
            let event = LapEvent::new(self.counter.next());
            counter!("laps_detected_total").increment(1);
            info!(
                seq = event.seq,
                channel = transition.channel,
                edge = ?transition.edge,
                "lap detected"
            );
            self.sink.publish(event).await;
        } else {
            debug!(
                channel = transition.channel,
                "transition inside cooldown window, discarded"
            );
        }
    }
}

/// Forward one source's transitions into the merge channel.
async fn pump_source(
    mut source: Box<dyn EdgeSource>,
    tx: mpsc::Sender<Result<Transition, SensorError>>,
    cancel: CancellationToken,
) {
    let channel = source.channel();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = source.next_transition() => {
                let Some(item) = next else {
                    debug!(channel, "edge source drained");
                    break;
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    break;
                }
                if failed {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    use crate::source::Edge;

    /// Test double fed by an mpsc channel.
    struct ScriptedSource {
        channel: u32,
        rx: mpsc::Receiver<Result<Transition, SensorError>>,
    }

    impl ScriptedSource {
        fn new(channel: u32) -> (Self, mpsc::Sender<Result<Transition, SensorError>>) {
            let (tx, rx) = mpsc::channel(16);
            (Self { channel, rx }, tx)
        }
    }

    #[async_trait]
    impl EdgeSource for ScriptedSource {
        fn channel(&self) -> u32 {
            self.channel
        }

        async fn next_transition(&mut self) -> Option<Result<Transition, SensorError>> {
            self.rx.recv().await
        }
    }

    /// Sink that records every published event.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<LapEvent>>,
    }

    #[async_trait]
    impl LapSink for RecordingSink {
        async fn publish(&self, event: LapEvent) {
            self.events.lock().await.push(event);
        }
    }

    fn transition(channel: u32) -> Result<Transition, SensorError> {
        Ok(Transition {
            channel,
            edge: Edge::Rising,
        })
    }

    fn spawn_watcher(
        window_ms: u64,
        sources: Vec<Box<dyn EdgeSource>>,
    ) -> (
        Arc<RecordingSink>,
        Arc<LapCounter>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let sink = Arc::new(RecordingSink::default());
        let counter = Arc::new(LapCounter::new());
        let cancel = CancellationToken::new();
        let watcher = SensorWatcher::new(
            Debouncer::new(Duration::from_millis(window_ms)),
            Arc::clone(&counter),
            sink.clone(),
        );
        let handle = tokio::spawn(watcher.run(sources, cancel.clone()));
        (sink, counter, cancel, handle)
    }

    #[tokio::test]
    async fn spaced_transitions_each_emit_one_event() {
        let (source, tx) = ScriptedSource::new(23);
        let (sink, counter, cancel, handle) = spawn_watcher(20, vec![Box::new(source)]);

        for _ in 0..3 {
            tx.send(transition(23)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        cancel.cancel();
        handle.await.unwrap();

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 3);
        assert_eq!(counter.current(), 3);
    }

    #[tokio::test]
    async fn clustered_transitions_emit_one_event() {
        let (source, tx) = ScriptedSource::new(23);
        let (sink, _counter, cancel, handle) = spawn_watcher(500, vec![Box::new(source)]);

        // A burst of bounce, all well inside the window
        for _ in 0..5 {
            tx.send(transition(23)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn either_channel_feeds_the_same_stream() {
        let (source_a, tx_a) = ScriptedSource::new(23);
        let (source_b, tx_b) = ScriptedSource::new(24);
        let (sink, _counter, cancel, handle) =
            spawn_watcher(20, vec![Box::new(source_a), Box::new(source_b)]);

        tx_a.send(transition(23)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx_b.send(transition(24)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.events.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn cross_channel_bounce_is_globally_debounced() {
        let (source_a, tx_a) = ScriptedSource::new(23);
        let (source_b, tx_b) = ScriptedSource::new(24);
        let (sink, _counter, cancel, handle) =
            spawn_watcher(500, vec![Box::new(source_a), Box::new(source_b)]);

        // Both beams see the same car; only one lap
        tx_a.send(transition(23)).await.unwrap();
        tx_b.send(transition(24)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic() {
        let (source, tx) = ScriptedSource::new(23);
        let (sink, _counter, cancel, handle) = spawn_watcher(10, vec![Box::new(source)]);

        for _ in 0..4 {
            tx.send(transition(23)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        cancel.cancel();
        handle.await.unwrap();

        let events = sink.events.lock().await;
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failing_source_retires_but_other_channel_survives() {
        let (source_a, tx_a) = ScriptedSource::new(23);
        let (source_b, tx_b) = ScriptedSource::new(24);
        let (sink, _counter, cancel, handle) =
            spawn_watcher(10, vec![Box::new(source_a), Box::new(source_b)]);

        tx_a.send(Err(SensorError::new("wire cut").with_channel(23)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        tx_b.send(transition(24)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn watcher_stops_when_all_sources_drain() {
        let (source, tx) = ScriptedSource::new(23);
        let (_sink, _counter, _cancel, handle) = spawn_watcher(10, vec![Box::new(source)]);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop on its own")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_watcher() {
        let (source, _tx) = ScriptedSource::new(23);
        let (_sink, _counter, cancel, handle) = spawn_watcher(10, vec![Box::new(source)]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should honor cancellation")
            .unwrap();
    }
}
