use super::*;

/// Ids of windows that have already fired.
///
/// Bounded: ids whose end falls more than `retention_ms` behind the watermark
/// are pruned, because the watermark alone already rejects their events.
#[derive(Debug, Clone)]
pub struct ClosedWindows<K> {
    ids: BTreeSet<WindowId<K>>,
    retention_ms: i64,
}

impl<K: GroupKey> ClosedWindows<K> {
    pub fn new(retention_ms: i64) -> Self {
        Self {
            ids: BTreeSet::new(),
            retention_ms,
        }
    }

    /// Record a fired window. Returns false if it had already fired.
    pub fn insert(&mut self, id: WindowId<K>) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &WindowId<K>) -> bool {
        self.ids.contains(id)
    }

    /// Forget ids whose end is more than `retention_ms` behind `watermark`.
    pub fn prune(&mut self, watermark: Watermark) {
        let cutoff = watermark.timestamp.saturating_sub(self.retention_ms);
        while let Some(oldest) = self.ids.first() {
            if oldest.window.end >= cutoff {
                break;
            }
            self.ids.pop_first();
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_vec(&self) -> Vec<WindowId<K>> {
        self.ids.iter().cloned().collect()
    }
}

/// Decides which windows are closed, finalizes each one exactly once and
/// keeps the late-event counter.
#[derive(Debug, Clone)]
pub struct WindowEmitter<K> {
    closed: ClosedWindows<K>,
    late_events: u64,
    emitted: u64,
}

impl<K: GroupKey> WindowEmitter<K> {
    /// `retention_ms` is how long fired ids are remembered past the
    /// watermark, normally one window length.
    pub fn new(retention_ms: i64) -> Self {
        Self {
            closed: ClosedWindows::new(retention_ms),
            late_events: 0,
            emitted: 0,
        }
    }

    /// Whether an event for `id` arrives too late to be merged.
    pub fn is_late(&self, id: &WindowId<K>, watermark: Option<Watermark>) -> bool {
        watermark.is_some_and(|wm| id.window.is_closed_at(wm)) || self.closed.contains(id)
    }

    pub fn record_late(&mut self) {
        self.late_events += 1;
    }

    /// Close every window in `store` that ended at or before `watermark` and
    /// return their results in firing order. Cells leave the store through
    /// [`AccumulatorStore::drain_closed`], one `take_and_clear` per window.
    pub fn fire(
        &mut self,
        watermark: Watermark,
        store: &mut AccumulatorStore<K>,
    ) -> Vec<AggregateResult<K>> {
        let mut results = Vec::new();
        for (id, acc) in store.drain_closed(watermark) {
            if !self.closed.insert(id.clone()) {
                // Already fired; the store should never hand it out twice.
                tracing::warn!(window = %id, "window closed twice, dropping duplicate");
                continue;
            }
            self.emitted += 1;
            results.push(AggregateResult::finalize(id, acc));
        }
        self.closed.prune(watermark);
        results
    }

    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn closed_windows(&self) -> &ClosedWindows<K> {
        &self.closed
    }

    /// Reinstate counters and the closed set from a snapshot.
    pub fn restore(&mut self, closed: Vec<WindowId<K>>, late_events: u64, emitted: u64) {
        self.closed.ids = closed.into_iter().collect();
        self.late_events = late_events;
        self.emitted = emitted;
    }
}
