use super::*;

/// What processing one record produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput<K> {
    /// False when the record was late and dropped.
    pub admitted: bool,
    /// Windows the record's watermark advance closed, in firing order.
    pub fired: Vec<AggregateResult<K>>,
}

/// Serializable state of a [`WindowOperator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSnapshot<K> {
    pub watermarks: WatermarkTracker,
    pub open_windows: Vec<(WindowId<K>, Accumulator)>,
    pub closed_windows: Vec<WindowId<K>>,
    pub late_events: u64,
    pub emitted_windows: u64,
}

/// Single-threaded keyed tumbling-window aggregation.
///
/// # Processing model
///
/// For every record, in this order:
/// 1. assign the record to its window,
/// 2. drop it as late if the *current* watermark already closed that window,
/// 3. otherwise merge it into the window's accumulator,
/// 4. advance the watermark with the record's timestamp,
/// 5. fire every window the new watermark closed.
///
/// A record therefore never closes its own window unless the bound is zero,
/// and a closed window's accumulator is never touched again.
pub struct WindowOperator<K: GroupKey> {
    assigner: TumblingWindows,
    watermarks: WatermarkTracker,
    store: AccumulatorStore<K>,
    emitter: WindowEmitter<K>,
}

impl<K: GroupKey> WindowOperator<K> {
    pub fn new(
        assigner: TumblingWindows,
        out_of_orderness_ms: i64,
        policy: MissingValuePolicy,
    ) -> Self {
        Self {
            assigner,
            watermarks: WatermarkTracker::new(out_of_orderness_ms),
            store: AccumulatorStore::new(policy),
            emitter: WindowEmitter::new(assigner.size_ms()),
        }
    }

    /// The window `record` belongs to.
    pub fn window_of(&self, record: &EventRecord<K>) -> WindowId<K> {
        WindowId::new(record.key.clone(), self.assigner.assign(record.timestamp))
    }

    pub fn process(&mut self, record: &EventRecord<K>) -> ProcessOutput<K> {
        let id = self.window_of(record);
        let admitted = if self.emitter.is_late(&id, self.watermarks.current()) {
            self.emitter.record_late();
            tracing::debug!(window = %id, timestamp = record.timestamp, "dropping late event");
            false
        } else {
            self.store.merge(id, record);
            true
        };

        let watermark = self.watermarks.observe(record.timestamp);
        let fired = self.emitter.fire(watermark, &mut self.store);
        ProcessOutput { admitted, fired }
    }

    /// Push the watermark to `timestamp` without a record and fire whatever
    /// that closes.
    pub fn advance_watermark(&mut self, timestamp: EventTime) -> Vec<AggregateResult<K>> {
        match self.watermarks.advance_to(timestamp) {
            Some(watermark) => self.emitter.fire(watermark, &mut self.store),
            None => Vec::new(),
        }
    }

    /// Close every open window. Used when bounded input ends.
    pub fn flush_all(&mut self) -> Vec<AggregateResult<K>> {
        self.advance_watermark(EVENT_TIME_MAX)
    }

    pub fn current_watermark(&self) -> Option<Watermark> {
        self.watermarks.current()
    }

    pub fn late_events(&self) -> u64 {
        self.emitter.late_events()
    }

    pub fn emitted_windows(&self) -> u64 {
        self.emitter.emitted()
    }

    pub fn open_windows(&self) -> usize {
        self.store.len()
    }

    pub fn store(&self) -> &AccumulatorStore<K> {
        &self.store
    }

    pub fn snapshot(&self) -> OperatorSnapshot<K> {
        OperatorSnapshot {
            watermarks: self.watermarks.clone(),
            open_windows: self.store.entries(),
            closed_windows: self.emitter.closed_windows().to_vec(),
            late_events: self.emitter.late_events(),
            emitted_windows: self.emitter.emitted(),
        }
    }

    pub fn restore(&mut self, snapshot: OperatorSnapshot<K>) {
        self.watermarks = snapshot.watermarks;
        self.store.restore(snapshot.open_windows);
        self.emitter.restore(
            snapshot.closed_windows,
            snapshot.late_events,
            snapshot.emitted_windows,
        );
    }
}
