use super::*;

/// Keyed accumulator store for one operator (or one partition worker).
///
/// Cells are created lazily on first merge and removed when taken. A
/// secondary index sorted by window end lets the emitter drain every closed
/// cell without scanning the open ones.
///
/// # Invariant
/// Every cell in `cells` appears exactly once in `by_end`, under its own
/// window end, and vice versa.
#[derive(Debug, Clone)]
pub struct AccumulatorStore<K: GroupKey> {
    policy: MissingValuePolicy,
    cells: HashMap<WindowId<K>, Accumulator>,
    by_end: BTreeMap<EventTime, BTreeSet<WindowId<K>>>,
}

impl<K: GroupKey> Default for AccumulatorStore<K> {
    fn default() -> Self {
        Self::new(MissingValuePolicy::default())
    }
}

impl<K: GroupKey> AccumulatorStore<K> {
    pub fn new(policy: MissingValuePolicy) -> Self {
        Self {
            policy,
            cells: HashMap::new(),
            by_end: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> MissingValuePolicy {
        self.policy
    }

    /// Fold `record` into the cell for `id`, creating it if needed.
    pub fn merge(&mut self, id: WindowId<K>, record: &EventRecord<K>) {
        let policy = self.policy;
        self.cell_mut(id).add(&record.category, record.value, policy);
    }

    /// Fold a partial aggregate into the cell for `id`.
    pub fn merge_state(&mut self, id: WindowId<K>, partial: &Accumulator) {
        self.cell_mut(id).merge(partial);
    }

    /// Remove and return the cell for `id`. A second call returns `None`.
    pub fn take_and_clear(&mut self, id: &WindowId<K>) -> Option<Accumulator> {
        let acc = self.cells.remove(id)?;
        if let Some(ids) = self.by_end.get_mut(&id.window.end) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_end.remove(&id.window.end);
            }
        }
        Some(acc)
    }

    /// Remove and return every cell whose window ended at or before
    /// `watermark`, ordered by window end, then start, then key. Each cell is
    /// taken through [`take_and_clear`](Self::take_and_clear).
    pub fn drain_closed(&mut self, watermark: Watermark) -> Vec<(WindowId<K>, Accumulator)> {
        let due: Vec<WindowId<K>> = self
            .by_end
            .range(..=watermark.timestamp)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect();

        due.into_iter()
            .filter_map(|id| {
                let acc = self.take_and_clear(&id)?;
                Some((id, acc))
            })
            .collect()
    }

    pub fn get(&self, id: &WindowId<K>) -> Option<&Accumulator> {
        self.cells.get(id)
    }

    pub fn contains(&self, id: &WindowId<K>) -> bool {
        self.cells.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Copy of every open cell in firing order, for snapshots.
    pub fn entries(&self) -> Vec<(WindowId<K>, Accumulator)> {
        self.by_end
            .values()
            .flatten()
            .filter_map(|id| self.cells.get(id).map(|acc| (id.clone(), acc.clone())))
            .collect()
    }

    /// Replace the store's contents with `entries`.
    pub fn restore(&mut self, entries: Vec<(WindowId<K>, Accumulator)>) {
        self.cells.clear();
        self.by_end.clear();
        for (id, acc) in entries {
            self.merge_state(id, &acc);
        }
    }

    fn cell_mut(&mut self, id: WindowId<K>) -> &mut Accumulator {
        if !self.cells.contains_key(&id) {
            self.by_end
                .entry(id.window.end)
                .or_default()
                .insert(id.clone());
        }
        self.cells.entry(id).or_default()
    }
}
