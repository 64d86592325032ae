use super::*;
use crate::window::TimeWindow;

fn id(key: i64, start: EventTime, end: EventTime) -> WindowId<i64> {
    WindowId::new(key, TimeWindow::new(start, end))
}

fn rec(key: i64, category: &str, value: Option<f64>) -> EventRecord<i64> {
    EventRecord::new(key, 0, category, value)
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

const CATEGORIES: [&str; 4] = ["VISUAL", "HEARING", "MOTOR", "COGNITIVE"];

fn random_partials(seed: u64, n: usize) -> Vec<Accumulator> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            let mut acc = Accumulator::new();
            for _ in 0..(lcg_next(&mut state) % 5) {
                let category = CATEGORIES[(lcg_next(&mut state) % 4) as usize];
                // Integer severities keep float sums exact under reordering.
                let value = match lcg_next(&mut state) % 6 {
                    0 => None,
                    v => Some(v as f64),
                };
                acc.add(category, value, MissingValuePolicy::Zero);
            }
            acc
        })
        .collect()
}

// ── Accumulator ───────────────────────────────────────────────────────────

#[test]
fn test_accumulator_add() {
    let mut acc = Accumulator::new();
    acc.add("VISUAL", Some(3.0), MissingValuePolicy::Zero);
    acc.add("HEARING", Some(5.0), MissingValuePolicy::Zero);
    acc.add("VISUAL", Some(4.0), MissingValuePolicy::Zero);

    assert_eq!(acc.count, 3);
    assert_eq!(acc.sum, 12.0);
    assert_eq!(acc.samples, 3);
    assert_eq!(acc.average(), 4.0);
    assert_eq!(acc.category_counts.get("VISUAL"), Some(&2));
    assert_eq!(acc.category_counts.get("HEARING"), Some(&1));
}

#[test]
fn test_missing_value_zero_counts_as_sample() {
    let mut acc = Accumulator::new();
    acc.add("VISUAL", Some(4.0), MissingValuePolicy::Zero);
    acc.add("VISUAL", None, MissingValuePolicy::Zero);
    assert_eq!(acc.count, 2);
    assert_eq!(acc.samples, 2);
    assert_eq!(acc.average(), 2.0);
}

#[test]
fn test_missing_value_exclude_skips_average() {
    let mut acc = Accumulator::new();
    acc.add("VISUAL", Some(4.0), MissingValuePolicy::Exclude);
    acc.add("MOTOR", None, MissingValuePolicy::Exclude);
    assert_eq!(acc.count, 2);
    assert_eq!(acc.samples, 1);
    assert_eq!(acc.average(), 4.0);
    assert_eq!(acc.category_counts.get("MOTOR"), Some(&1));
}

#[test]
fn test_average_without_samples_is_zero() {
    let mut acc = Accumulator::new();
    assert_eq!(acc.average(), 0.0);
    acc.add("VISUAL", None, MissingValuePolicy::Exclude);
    assert_eq!(acc.average(), 0.0);
}

#[test]
fn test_missing_value_policy_from_str() {
    assert_eq!("zero".parse::<MissingValuePolicy>().unwrap(), MissingValuePolicy::Zero);
    assert_eq!("Exclude".parse::<MissingValuePolicy>().unwrap(), MissingValuePolicy::Exclude);
    assert!("ignore".parse::<MissingValuePolicy>().is_err());
}

#[test]
fn test_merge_states_is_commutative_and_associative() {
    let partials = random_partials(11, 60);
    for w in partials.windows(3) {
        let (a, b, c) = (&w[0], &w[1], &w[2]);
        assert_eq!(merge_states(a, b), merge_states(b, a));
        assert_eq!(
            merge_states(&merge_states(a, b), c),
            merge_states(a, &merge_states(b, c))
        );
        assert_eq!(merge_states(a, &Accumulator::default()), *a);
    }
}

#[test]
fn test_any_split_gives_the_same_result() {
    let mut state = 99u64;
    let records: Vec<(String, Option<f64>)> = (0..500)
        .map(|_| {
            let category = CATEGORIES[(lcg_next(&mut state) % 4) as usize].to_string();
            let value = Some((lcg_next(&mut state) % 5 + 1) as f64);
            (category, value)
        })
        .collect();

    let mut whole = Accumulator::new();
    for (category, value) in &records {
        whole.add(category, *value, MissingValuePolicy::Zero);
    }

    for parts in [2usize, 3, 7, 16] {
        let mut partials = vec![Accumulator::new(); parts];
        for (category, value) in &records {
            let p = (lcg_next(&mut state) % parts as u64) as usize;
            partials[p].add(category, *value, MissingValuePolicy::Zero);
        }
        let merged = partials
            .iter()
            .rev()
            .fold(Accumulator::default(), |acc, p| merge_states(&acc, p));
        assert_eq!(merged, whole, "split into {parts} partitions diverged");
    }
}

#[test]
fn test_finalize_result() {
    let mut acc = Accumulator::new();
    acc.add("VISUAL", Some(3.0), MissingValuePolicy::Zero);
    acc.add("HEARING", Some(5.0), MissingValuePolicy::Zero);
    let result = AggregateResult::finalize(id(42, 0, 100), acc);
    assert_eq!(result.key, 42);
    assert_eq!(result.window_start, 0);
    assert_eq!(result.window_end, 100);
    assert_eq!(result.count, 2);
    assert_eq!(result.average, 4.0);
    assert_eq!(result.category_breakdown.len(), 2);
}

// ── AccumulatorStore ──────────────────────────────────────────────────────

#[test]
fn test_store_merge_creates_lazily() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Zero);
    assert!(store.is_empty());
    store.merge(id(1, 0, 10), &rec(1, "A", Some(2.0)));
    store.merge(id(1, 0, 10), &rec(1, "B", Some(4.0)));
    store.merge(id(2, 0, 10), &rec(2, "A", Some(1.0)));
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(&id(1, 0, 10)).map(|a| a.count), Some(2));
}

#[test]
fn test_store_uses_its_policy() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Exclude);
    store.merge(id(1, 0, 10), &rec(1, "A", None));
    assert_eq!(store.get(&id(1, 0, 10)).map(|a| a.samples), Some(0));
}

#[test]
fn test_take_and_clear_exactly_once() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Zero);
    store.merge(id(1, 0, 10), &rec(1, "A", Some(2.0)));
    let taken = store.take_and_clear(&id(1, 0, 10)).unwrap();
    assert_eq!(taken.count, 1);
    assert!(store.take_and_clear(&id(1, 0, 10)).is_none());
    assert!(store.drain_closed(Watermark::new(100)).is_empty());
}

#[test]
fn test_drain_closed_by_watermark() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Zero);
    store.merge(id(2, 0, 10), &rec(2, "A", None));
    store.merge(id(1, 10, 20), &rec(1, "A", None));
    store.merge(id(1, 0, 10), &rec(1, "A", None));

    assert!(store.drain_closed(Watermark::new(9)).is_empty());
    let drained: Vec<WindowId<i64>> = store
        .drain_closed(Watermark::new(10))
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(drained, vec![id(1, 0, 10), id(2, 0, 10)]);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_drained_cells_leave_the_end_index() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Zero);
    store.merge(id(1, 0, 10), &rec(1, "A", Some(1.0)));
    store.merge(id(2, 0, 10), &rec(2, "A", Some(1.0)));
    store.merge(id(3, 10, 20), &rec(3, "A", Some(1.0)));

    assert_eq!(store.drain_closed(Watermark::new(10)).len(), 2);
    assert!(store.take_and_clear(&id(1, 0, 10)).is_none());
    // Only the open cell is left, both in the cells and in the index.
    assert_eq!(store.entries(), vec![(id(3, 10, 20), store.get(&id(3, 10, 20)).unwrap().clone())]);

    // A window that reopens after draining is tracked again.
    store.merge(id(1, 0, 10), &rec(1, "B", None));
    let drained = store.drain_closed(Watermark::new(20));
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].0, id(1, 0, 10));
    assert_eq!(drained[0].1.count, 1);
    assert!(store.is_empty());
    assert!(store.entries().is_empty());
}

#[test]
fn test_merge_state_combines_partials() {
    let mut left = AccumulatorStore::new(MissingValuePolicy::Zero);
    let mut right = AccumulatorStore::new(MissingValuePolicy::Zero);
    left.merge(id(1, 0, 10), &rec(1, "A", Some(2.0)));
    right.merge(id(1, 0, 10), &rec(1, "B", Some(6.0)));

    let mut reduce = AccumulatorStore::new(MissingValuePolicy::Zero);
    for (wid, acc) in left.entries().into_iter().chain(right.entries()) {
        reduce.merge_state(wid, &acc);
    }
    let acc = reduce.get(&id(1, 0, 10)).unwrap();
    assert_eq!(acc.count, 2);
    assert_eq!(acc.average(), 4.0);
}

#[test]
fn test_restore_replaces_contents() {
    let mut store = AccumulatorStore::new(MissingValuePolicy::Zero);
    store.merge(id(1, 0, 10), &rec(1, "A", Some(2.0)));
    let entries = store.entries();

    let mut other = AccumulatorStore::new(MissingValuePolicy::Zero);
    other.merge(id(9, 50, 60), &rec(9, "Z", None));
    other.restore(entries.clone());
    assert_eq!(other.entries(), entries);
    assert!(other.drain_closed(Watermark::new(60)).len() == 1);
}
