use super::*;

/// Tracks per-partition watermarks in the reduce stage and computes the
/// aligned minimum.
///
/// Every partition worker forwards the watermark after it has drained its
/// closed partials. The reduce stage may only finalize a window once *all*
/// partitions have passed its end, because a lagging partition can still hold
/// a partial for it.
///
/// # Finished partitions
/// A partition that has sent its end marker is excluded from the minimum so
/// that the remaining partitions can keep the clock moving.
pub struct WatermarkAligner {
    /// Per-partition last-seen watermark timestamp. Starts at EVENT_TIME_MIN.
    partition_watermarks: Vec<EventTime>,
    /// Whether each partition has finished.
    finished: Vec<bool>,
    /// The aligned watermark last released downstream.
    current_min: EventTime,
}

impl WatermarkAligner {
    /// Create an aligner for `num_partitions` upstream partitions.
    pub fn new(num_partitions: usize) -> Self {
        Self {
            partition_watermarks: vec![EVENT_TIME_MIN; num_partitions],
            finished: vec![false; num_partitions],
            current_min: EVENT_TIME_MIN,
        }
    }

    /// Record a watermark from `partition`.
    ///
    /// Returns `Some(watermark)` if the aligned minimum advanced, `None`
    /// otherwise. A stale watermark is clamped to the current minimum, so the
    /// aligned watermark never regresses.
    pub fn advance(&mut self, partition: usize, watermark: Watermark) -> Option<Watermark> {
        let slot = &mut self.partition_watermarks[partition];
        *slot = (*slot).max(watermark.timestamp).max(self.current_min);
        self.release()
    }

    /// Exclude `partition` from the minimum. Returns the aligned watermark if
    /// excluding it let the minimum advance.
    pub fn mark_finished(&mut self, partition: usize) -> Option<Watermark> {
        self.finished[partition] = true;
        self.release()
    }

    /// Return the aligned watermark, or `None` before every partition reported.
    pub fn current(&self) -> Option<Watermark> {
        (self.current_min != EVENT_TIME_MIN).then(|| Watermark::new(self.current_min))
    }

    pub fn num_partitions(&self) -> usize {
        self.partition_watermarks.len()
    }

    fn release(&mut self) -> Option<Watermark> {
        let new_min = self.compute_min()?;
        if new_min > self.current_min {
            self.current_min = new_min;
            Some(Watermark::new(new_min))
        } else {
            None
        }
    }

    /// Minimum across unfinished partitions; `None` once all have finished.
    fn compute_min(&self) -> Option<EventTime> {
        self.partition_watermarks
            .iter()
            .zip(self.finished.iter())
            .filter(|(_, finished)| !**finished)
            .map(|(ts, _)| *ts)
            .min()
    }
}
