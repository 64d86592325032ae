use std::io::BufRead;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};

use crate::channel::{local_channel, LocalChannelReceiver, LocalChannelSender};
use crate::checkpoint::FsCheckpointStorage;
use crate::config::{EndOfInput, JobConfig};
use crate::error::ConfigError;
use crate::input_gate::InputGate;
use crate::record::EventRecord;
use crate::sink::{open_sink, Sink, SinkStats, SinkWriter};
use crate::state::{Accumulator, AccumulatorStore, AggregateResult, MissingValuePolicy};
use crate::time::{WatermarkAligner, WatermarkTracker, EVENT_TIME_MAX};
use crate::types::{EventTime, SchoolId, StreamElement, Watermark};
use crate::window::{OperatorSnapshot, TumblingWindows, WindowEmitter, WindowId, WindowOperator};

use super::{open_input, record_partitioner, JobMetrics, JobSummary, RecordReader, ShutdownSignal};

type ResultSender = LocalChannelSender<AggregateResult<SchoolId>>;
type RoutedRecord = (WindowId<SchoolId>, EventRecord<SchoolId>);
type Partial = (WindowId<SchoolId>, Accumulator);

/// How ingestion ended and the operator state left behind.
struct IngestOutcome {
    interrupted: bool,
    flushed: bool,
    snapshot: OperatorSnapshot<SchoolId>,
}

/// The weekly-metrics job: source, windowed aggregation, sink.
///
/// # Stages
///
/// With `parallelism = 1` the calling thread reads, decodes and aggregates;
/// a sink thread writes results. With `parallelism = N` the calling thread
/// reads, assigns windows, drops late events and routes records to N
/// partition workers; a reduce thread merges their partial aggregates and
/// fires windows once every partition has passed their end. Stages are
/// joined by bounded channels.
///
/// The watermark clock lives only in the ingest stage. Workers drain their
/// closed partials when a watermark arrives and then forward it, so by the
/// time the reduce stage sees the aligned watermark pass a window's end it
/// holds every partial of that window.
pub struct Pipeline {
    config: JobConfig,
    windows: TumblingWindows,
    shutdown: ShutdownSignal,
    checkpoint: Option<FsCheckpointStorage>,
    metrics: Arc<JobMetrics>,
}

impl Pipeline {
    /// Validate `config` and build the pipeline.
    pub fn new(config: JobConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let windows = config.window_assigner()?;
        let checkpoint = config.checkpoint_path.clone().map(FsCheckpointStorage::new);
        Ok(Self {
            config,
            windows,
            shutdown: ShutdownSignal::new(),
            checkpoint,
            metrics: Arc::new(JobMetrics::new()),
        })
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn metrics(&self) -> Arc<JobMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run the job over `input` until it is exhausted or shutdown is
    /// requested, delivering results to `sink`.
    pub fn run<R: BufRead, S: Sink + 'static>(&self, input: R, sink: S) -> Result<JobSummary> {
        tracing::info!(
            window_length_ms = self.windows.size_ms(),
            epoch_offset_ms = self.windows.offset_ms(),
            out_of_orderness_ms = self.config.out_of_orderness_ms,
            parallelism = self.config.parallelism,
            sink = %sink.describe(),
            "starting job"
        );

        let (results_tx, results_rx) = local_channel(self.config.channel_capacity);
        let writer = SinkWriter::new(sink, self.config.sink_batch_size, self.config.retry_policy());
        let sink_handle = thread::Builder::new()
            .name("sink".to_string())
            .spawn(move || run_sink_stage(results_rx, writer))
            .context("failed to spawn sink stage")?;

        let ingest = self.restore().and_then(|restored| {
            let reader = RecordReader::new(
                input,
                self.config.on_decode_error,
                Arc::clone(&self.metrics),
                self.shutdown.clone(),
            );
            if self.config.parallelism <= 1 {
                self.run_inline(reader, restored, results_tx)
            } else {
                self.run_partitioned(reader, restored, results_tx)
            }
        });

        // The sink's own failure is the root cause of any send error upstream.
        let stats = join_stage(sink_handle, "sink").context("sink stage failed")?;
        let outcome = ingest?;

        let checkpoint_written = self.finish_checkpoint(&outcome)?;
        let summary = JobSummary {
            records_read: JobMetrics::get(&self.metrics.records_read),
            decode_errors: JobMetrics::get(&self.metrics.decode_errors),
            late_events_dropped: JobMetrics::get(&self.metrics.late_events_dropped),
            windows_emitted: JobMetrics::get(&self.metrics.windows_emitted),
            rows_written: stats.rows_written,
            sink_batches: stats.batches_written,
            sink_retries: stats.retries,
            open_windows: outcome.snapshot.open_windows.len() as u64,
            interrupted: outcome.interrupted,
            checkpoint_written,
        };
        tracing::info!(%summary, "job finished");
        Ok(summary)
    }

    fn restore(&self) -> Result<Option<OperatorSnapshot<SchoolId>>> {
        let Some(storage) = &self.checkpoint else {
            return Ok(None);
        };
        let snapshot = storage.load::<SchoolId>(self.windows)?;
        if let Some(snapshot) = &snapshot {
            tracing::info!(
                path = %storage.path().display(),
                open_windows = snapshot.open_windows.len(),
                watermark = ?snapshot.watermarks.current(),
                "restored checkpoint"
            );
        }
        Ok(snapshot)
    }

    fn finish_checkpoint(&self, outcome: &IngestOutcome) -> Result<bool> {
        let Some(storage) = &self.checkpoint else {
            return Ok(false);
        };
        if outcome.flushed {
            storage.clear()?;
            return Ok(false);
        }
        storage.save(self.windows, &outcome.snapshot)?;
        tracing::info!(
            path = %storage.path().display(),
            open_windows = outcome.snapshot.open_windows.len(),
            "checkpoint written"
        );
        Ok(true)
    }

    /// Whether open windows are flushed when reading stops.
    fn should_flush(&self, interrupted: bool) -> bool {
        !interrupted && self.config.end_of_input == EndOfInput::Flush
    }

    fn run_inline<R: BufRead>(
        &self,
        mut reader: RecordReader<R>,
        restored: Option<OperatorSnapshot<SchoolId>>,
        results: ResultSender,
    ) -> Result<IngestOutcome> {
        let mut operator = WindowOperator::new(
            self.windows,
            self.config.out_of_orderness_ms,
            self.config.missing_value,
        );
        if let Some(snapshot) = restored {
            operator.restore(snapshot);
        }

        while let Some(record) = reader.next_record()? {
            let output = operator.process(&record);
            if !output.admitted {
                JobMetrics::incr(&self.metrics.late_events_dropped);
            }
            if let Some(watermark) = operator.current_watermark() {
                emit_round(&results, &self.metrics, output.fired, watermark)?;
            }
        }

        let interrupted = reader.interrupted();
        let flushed = self.should_flush(interrupted);
        if flushed {
            let fired = operator.flush_all();
            emit_round(&results, &self.metrics, fired, Watermark::new(EVENT_TIME_MAX))?;
        }
        results.send(StreamElement::End)?;

        Ok(IngestOutcome {
            interrupted,
            flushed,
            snapshot: operator.snapshot(),
        })
    }

    fn run_partitioned<R: BufRead>(
        &self,
        mut reader: RecordReader<R>,
        restored: Option<OperatorSnapshot<SchoolId>>,
        results: ResultSender,
    ) -> Result<IngestOutcome> {
        let n = self.config.parallelism;
        let capacity = self.config.channel_capacity;
        let policy = self.config.missing_value;

        let mut tracker = WatermarkTracker::new(self.config.out_of_orderness_ms);
        let mut late_filter = WindowEmitter::<SchoolId>::new(self.windows.size_ms());
        let mut reduce_store = AccumulatorStore::new(policy);
        let mut reduce_emitter = WindowEmitter::new(self.windows.size_ms());
        if let Some(snapshot) = restored {
            tracker = snapshot.watermarks;
            late_filter.restore(Vec::new(), snapshot.late_events, 0);
            reduce_store.restore(snapshot.open_windows);
            reduce_emitter.restore(snapshot.closed_windows, 0, snapshot.emitted_windows);
        }

        let mut worker_txs = Vec::with_capacity(n);
        let mut partial_rxs = Vec::with_capacity(n);
        let mut workers = Vec::with_capacity(n);
        for idx in 0..n {
            let (tx, rx) = local_channel::<RoutedRecord>(capacity);
            let (partial_tx, partial_rx) = local_channel::<Partial>(capacity);
            let handle = thread::Builder::new()
                .name(format!("partition-{idx}"))
                .spawn(move || run_partition_worker(rx, partial_tx, policy))
                .context("failed to spawn partition worker")?;
            worker_txs.push(tx);
            partial_rxs.push(partial_rx);
            workers.push(handle);
        }

        let metrics = Arc::clone(&self.metrics);
        let reduce = thread::Builder::new()
            .name("reduce".to_string())
            .spawn(move || {
                run_reduce_stage(
                    InputGate::new(partial_rxs),
                    reduce_store,
                    reduce_emitter,
                    results,
                    metrics,
                )
            })
            .context("failed to spawn reduce stage")?;

        let partitioner = record_partitioner::<SchoolId>(self.config.partitioning);
        let mut ingest = || -> Result<(bool, bool)> {
            // Start of the window holding the last broadcast watermark. Every
            // window end is a window boundary, so nothing new can close until
            // the watermark moves into a later window.
            let mut broadcast_window: Option<EventTime> = None;
            while let Some(record) = reader.next_record()? {
                let timestamp = record.timestamp;
                let id = WindowId::new(record.key, self.windows.assign(timestamp));
                if late_filter.is_late(&id, tracker.current()) {
                    late_filter.record_late();
                    JobMetrics::incr(&self.metrics.late_events_dropped);
                    tracing::debug!(window = %id, timestamp, "dropping late event");
                } else {
                    let p = partitioner.partition(&record, n);
                    worker_txs[p].send_record((id, record))?;
                }

                let watermark = tracker.observe(timestamp);
                let window_start = self.windows.assign(watermark.timestamp).start;
                if broadcast_window.map_or(true, |start| window_start > start) {
                    broadcast(&worker_txs, watermark)?;
                    broadcast_window = Some(window_start);
                }
            }

            let interrupted = reader.interrupted();
            let flushed = self.should_flush(interrupted);
            if flushed {
                if let Some(watermark) = tracker.advance_to(EVENT_TIME_MAX) {
                    broadcast(&worker_txs, watermark)?;
                }
            }
            for tx in &worker_txs {
                tx.send(StreamElement::End)?;
            }
            Ok((interrupted, flushed))
        };
        let ingest_result = ingest();
        drop(worker_txs);

        let mut worker_error = None;
        for (idx, handle) in workers.into_iter().enumerate() {
            if let Err(e) = join_stage(handle, "partition worker") {
                if worker_error.is_none() {
                    worker_error = Some(e.context(format!("partition worker {idx} failed")));
                }
            }
        }
        let reduce_result = join_stage(reduce, "reduce");

        let (interrupted, flushed) = ingest_result?;
        if let Some(e) = worker_error {
            return Err(e);
        }
        let (reduce_store, reduce_emitter) = reduce_result.context("reduce stage failed")?;

        Ok(IngestOutcome {
            interrupted,
            flushed,
            snapshot: OperatorSnapshot {
                watermarks: tracker,
                open_windows: reduce_store.entries(),
                closed_windows: reduce_emitter.closed_windows().to_vec(),
                late_events: late_filter.late_events(),
                emitted_windows: reduce_emitter.emitted(),
            },
        })
    }
}

/// Open the configured input and sink and run the job to completion.
pub fn run_job(config: JobConfig, shutdown: ShutdownSignal) -> Result<JobSummary> {
    let pipeline = Pipeline::new(config)?.with_shutdown(shutdown);
    let input = open_input(&pipeline.config().input)?;
    let sink = open_sink(pipeline.config())?;
    pipeline.run(input, sink)
}

/// Send one firing round to the sink stage. The trailing watermark tells the
/// sink the round is complete and may be flushed.
fn emit_round(
    results: &ResultSender,
    metrics: &JobMetrics,
    fired: Vec<AggregateResult<SchoolId>>,
    watermark: Watermark,
) -> Result<()> {
    if fired.is_empty() {
        return Ok(());
    }
    JobMetrics::add(&metrics.windows_emitted, fired.len() as u64);
    for result in fired {
        tracing::debug!(
            school_id = result.key,
            window_start = result.window_start,
            count = result.count,
            "window fired"
        );
        results.send_record(result)?;
    }
    results.send(StreamElement::Watermark(watermark))
}

fn broadcast<T>(senders: &[LocalChannelSender<T>], watermark: Watermark) -> Result<()> {
    for tx in senders {
        tx.send(StreamElement::Watermark(watermark))?;
    }
    Ok(())
}

fn run_sink_stage<S: Sink>(
    results: LocalChannelReceiver<AggregateResult<SchoolId>>,
    mut writer: SinkWriter<S>,
) -> Result<SinkStats> {
    loop {
        match results.recv() {
            Ok(StreamElement::Record(result)) => writer.push(result)?,
            Ok(StreamElement::Watermark(_)) => writer.flush()?,
            // A dropped sender means upstream failed; keep what was emitted.
            Ok(StreamElement::End) | Err(_) => break,
        }
    }
    writer.flush()?;
    Ok(writer.stats())
}

fn run_partition_worker(
    records: LocalChannelReceiver<RoutedRecord>,
    partials: LocalChannelSender<Partial>,
    policy: MissingValuePolicy,
) -> Result<()> {
    let mut store = AccumulatorStore::new(policy);
    loop {
        match records.recv()? {
            StreamElement::Record((id, record)) => store.merge(id, &record),
            StreamElement::Watermark(watermark) => {
                for partial in store.drain_closed(watermark) {
                    partials.send_record(partial)?;
                }
                partials.send(StreamElement::Watermark(watermark))?;
            }
            StreamElement::End => {
                // Hand over still-open partials so the reduce stage holds the
                // complete state for checkpointing.
                for partial in store.drain_closed(Watermark::new(EVENT_TIME_MAX)) {
                    partials.send_record(partial)?;
                }
                partials.send(StreamElement::End)?;
                return Ok(());
            }
        }
    }
}

fn run_reduce_stage(
    mut gate: InputGate<Partial>,
    mut store: AccumulatorStore<SchoolId>,
    mut emitter: WindowEmitter<SchoolId>,
    results: ResultSender,
    metrics: Arc<JobMetrics>,
) -> Result<(AccumulatorStore<SchoolId>, WindowEmitter<SchoolId>)> {
    let mut aligner = WatermarkAligner::new(gate.num_channels());
    while let Some((partition, element)) = gate.next()? {
        let released = match element {
            StreamElement::Record((id, partial)) => {
                store.merge_state(id, &partial);
                None
            }
            StreamElement::Watermark(watermark) => aligner.advance(partition, watermark),
            StreamElement::End => aligner.mark_finished(partition),
        };
        if let Some(watermark) = released {
            let fired = emitter.fire(watermark, &mut store);
            emit_round(&results, &metrics, fired, watermark)?;
        }
    }
    results.send(StreamElement::End)?;
    Ok((store, emitter))
}

fn join_stage<T>(handle: JoinHandle<Result<T>>, stage: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{} stage panicked", stage))?
}
