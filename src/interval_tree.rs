//! A container of half-open `[begin, end)` intervals over `i64` keys,
//! parameterized by splitter/reducer/combinator hooks so the same primitive
//! can back any per-value merge policy.
//!
//! This is a small, linear-scan structure rather than a balanced tree: the
//! cache built on top of it holds at most a few hundred intervals in
//! practice, and correctness of the split/merge passes matters far more
//! here than asymptotic lookup cost.

/// A half-open interval `[begin, end)` carrying an arbitrary value.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<V> {
    pub begin: i64,
    pub end: i64,
    pub value: V,
}

impl<V> Interval<V> {
    pub fn new(begin: i64, end: i64, value: V) -> Self {
        debug_assert!(begin < end, "interval must be non-empty: [{begin}, {end})");
        Interval { begin, end, value }
    }

    fn contains_point(&self, point: i64) -> bool {
        self.begin <= point && point < self.end
    }

    fn overlaps(&self, lo: i64, hi: i64) -> bool {
        self.begin < hi && lo < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntervalTree<V> {
    intervals: Vec<Interval<V>>,
}

impl<V: Clone> IntervalTree<V> {
    pub fn new() -> Self {
        IntervalTree {
            intervals: Vec::new(),
        }
    }

    pub fn add(&mut self, interval: Interval<V>) {
        self.intervals.push(interval);
        self.intervals.sort_by_key(|iv| iv.begin);
    }

    /// Removes every stored interval matching `predicate`, returning them.
    pub fn remove(&mut self, mut predicate: impl FnMut(&Interval<V>) -> bool) -> Vec<Interval<V>> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.intervals.len());
        for iv in self.intervals.drain(..) {
            if predicate(&iv) {
                removed.push(iv);
            } else {
                kept.push(iv);
            }
        }
        self.intervals = kept;
        removed
    }

    /// All intervals containing `point`.
    pub fn at(&self, point: i64) -> Vec<&Interval<V>> {
        self.intervals
            .iter()
            .filter(|iv| iv.contains_point(point))
            .collect()
    }

    /// All intervals intersecting `[lo, hi)`.
    pub fn overlap(&self, lo: i64, hi: i64) -> Vec<&Interval<V>> {
        self.intervals
            .iter()
            .filter(|iv| iv.overlaps(lo, hi))
            .collect()
    }

    /// All stored intervals, sorted by `begin`.
    pub fn iterate(&self) -> impl Iterator<Item = &Interval<V>> {
        self.intervals.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// For every interval `iv` with `iv.begin < point < iv.end`: remove
    /// `iv`, insert `[iv.begin, point)` with `splitter(iv, lower=true,
    /// point)` and `[point, iv.end)` with `splitter(iv, lower=false,
    /// point)`. Intervals where `iv.begin == point` are left untouched.
    pub fn slice_at(&mut self, point: i64, splitter: &impl Fn(&Interval<V>, bool, i64) -> V) {
        let hit = self.remove(|iv| iv.begin < point && point < iv.end);
        for iv in hit {
            let lower_value = splitter(&iv, true, point);
            let upper_value = splitter(&iv, false, point);
            self.add(Interval::new(iv.begin, point, lower_value));
            self.add(Interval::new(point, iv.end, upper_value));
        }
    }

    /// Collect all distinct boundary points of currently stored intervals
    /// and `slice_at` each one. After this, the set of intervals is the
    /// unique finest partition whose boundaries are the union of the
    /// originals' boundaries.
    pub fn split_all_overlaps(&mut self, splitter: impl Fn(&Interval<V>, bool, i64) -> V) {
        let mut bounds: Vec<i64> = self
            .intervals
            .iter()
            .flat_map(|iv| [iv.begin, iv.end])
            .collect();
        bounds.sort_unstable();
        bounds.dedup();

        if bounds.len() <= 2 {
            return;
        }

        for &b in &bounds {
            self.slice_at(b, &splitter);
        }
    }

    /// For every maximal group of intervals sharing the same `(begin,
    /// end)`, replace them with one interval whose value is the left-fold
    /// of the group by `reducer(earlier, later)`.
    pub fn merge_equal(&mut self, reducer: impl Fn(V, V) -> V) {
        let mut by_range: Vec<(i64, i64, Vec<V>)> = Vec::new();
        for iv in self.intervals.drain(..) {
            match by_range
                .iter_mut()
                .find(|(b, e, _)| *b == iv.begin && *e == iv.end)
            {
                Some((_, _, values)) => values.push(iv.value),
                None => by_range.push((iv.begin, iv.end, vec![iv.value])),
            }
        }
        for (begin, end, values) in by_range {
            let mut iter = values.into_iter();
            let first = iter.next().expect("group is never empty");
            let folded = iter.fold(first, &reducer);
            self.intervals.push(Interval::new(begin, end, folded));
        }
        self.intervals.sort_by_key(|iv| iv.begin);
    }

    /// For every maximal run of intervals where each interval's `end`
    /// equals the next interval's `begin` *and* `can_merge` allows combining
    /// the pair, replace the run with one interval `[run_begin, run_end)`
    /// whose value is the left-fold by `combinator(earlier, later)`. A run
    /// breaks wherever `can_merge` returns `false`, even if the endpoints
    /// still touch.
    pub fn merge_adjacent(
        &mut self,
        can_merge: impl Fn(&V, &V) -> bool,
        combinator: impl Fn(V, V) -> V,
    ) {
        if self.intervals.is_empty() {
            return;
        }
        self.intervals.sort_by_key(|iv| iv.begin);

        let mut merged = Vec::with_capacity(self.intervals.len());
        let mut iter = self.intervals.drain(..);
        let mut run = iter.next().expect("checked non-empty above");

        for next in iter {
            if run.end == next.begin && can_merge(&run.value, &next.value) {
                let combined_value = combinator(run.value, next.value);
                run = Interval::new(run.begin, next.end, combined_value);
            } else {
                merged.push(run);
                run = next;
            }
        }
        merged.push(run);
        self.intervals = merged;
    }
}
