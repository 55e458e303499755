//! The multi-resolution interval cache. Built on
//! [`crate::interval_tree::IntervalTree`], specialized to [`IntervalData`]
//! via the period splitter, resolution reducer and series combinator hooks.

use crate::error::{Error, Result};
use crate::interval_tree::{Interval, IntervalTree};
use crate::time::{extrapolate, roll_up, Resolution};

/// The value attached to each stored interval: a sample series at a single
/// resolution, plus the bounds it covers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntervalData {
    pub resolution: Resolution,
    pub start: i64,
    pub end: i64,
    pub series: Vec<f64>,
}

impl IntervalData {
    fn index_of(&self, point: i64) -> usize {
        ((point - self.start) / self.resolution.seconds()) as usize
    }
}

/// An `IntervalData` tagged with the sequence number of the `merge` call
/// that introduced it, inherited unchanged by every piece a split produces.
/// Lets [`resolution_reducer`] break resolution ties by true merge
/// chronology instead of incidental `Vec` position.
#[derive(Debug, Clone)]
struct Entry {
    gen: u64,
    data: IntervalData,
}

/// A set of non-overlapping, non-adjacent-with-equal-resolution intervals
/// covering arbitrary portions of the timeline, each holding the finest
/// resolution ever merged in for its span.
#[derive(Debug, Clone, Default)]
pub struct ChartCache {
    tree: IntervalTree<Entry>,
    next_gen: u64,
}

fn validate_aligned(start: i64, end: i64, resolution: Resolution) -> Result<()> {
    if end <= start {
        return Err(Error::InvalidRange { start, end });
    }
    let res = resolution.seconds();
    if start % res != 0 || end % res != 0 {
        return Err(Error::UnalignedRange {
            start,
            end,
            resolution: res,
        });
    }
    Ok(())
}

/// Splits an `Entry` at `point`: the lower half keeps samples strictly
/// before `point`, the upper half keeps samples from `point` onward, both
/// inheriting the parent's resolution and generation.
fn period_splitter(iv: &Interval<Entry>, lower: bool, point: i64) -> Entry {
    let data = &iv.value.data;
    let idx = data.index_of(point);
    let new_data = if lower {
        IntervalData {
            resolution: data.resolution,
            start: data.start,
            end: point,
            series: data.series[..idx].to_vec(),
        }
    } else {
        IntervalData {
            resolution: data.resolution,
            start: point,
            end: data.end,
            series: data.series[idx..].to_vec(),
        }
    };
    Entry {
        gen: iv.value.gen,
        data: new_data,
    }
}

/// Among intervals with identical `(begin, end)`, keeps the one with the
/// finest (smallest-numeric) resolution; ties keep the entry with the lower
/// generation — the one that was already cached, rather than whichever one
/// a fold happened to see first.
fn resolution_reducer(a: Entry, b: Entry) -> Entry {
    use std::cmp::Ordering;
    match a.data.resolution.cmp(&b.data.resolution) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if a.gen <= b.gen {
                a
            } else {
                b
            }
        }
    }
}

/// Concatenates the sample series of two adjacent, same-resolution
/// intervals into one, keeping the older (lower) of the two generations.
fn series_combinator(earlier: Entry, later: Entry) -> Entry {
    debug_assert_eq!(earlier.data.resolution, later.data.resolution);
    let mut series = earlier.data.series;
    series.extend(later.data.series);
    Entry {
        gen: earlier.gen.min(later.gen),
        data: IntervalData {
            resolution: earlier.data.resolution,
            start: earlier.data.start,
            end: later.data.end,
            series,
        },
    }
}

impl ChartCache {
    pub fn new() -> Self {
        ChartCache {
            tree: IntervalTree::new(),
            next_gen: 0,
        }
    }

    /// Incorporates `data` for `[start, end)` at `resolution`, preserving
    /// invariants I1–I5.
    pub fn merge(&mut self, start: i64, end: i64, resolution: Resolution, data: Vec<f64>) -> Result<()> {
        validate_aligned(start, end, resolution)?;
        let expected = ((end - start) / resolution.seconds()) as usize;
        if data.len() != expected {
            return Err(Error::DataLengthMismatch {
                start,
                end,
                resolution: resolution.seconds(),
                expected,
                actual: data.len(),
            });
        }

        let gen = self.next_gen;
        self.next_gen += 1;

        let new_entry = Entry {
            gen,
            data: IntervalData {
                resolution,
                start,
                end,
                series: data,
            },
        };
        self.tree.add(Interval::new(start, end, new_entry));

        self.tree.split_all_overlaps(period_splitter);
        self.tree.merge_equal(resolution_reducer);
        self.tree
            .merge_adjacent(|a, b| a.data.resolution == b.data.resolution, series_combinator);

        Ok(())
    }

    /// Returns the samples covering `[start, end)`. `resolution == 0` means
    /// "whatever native resolutions the covering intervals use". The
    /// caller guarantees `[start, end)` is entirely covered.
    pub fn query(&self, start: i64, end: i64, resolution: i64) -> Result<Vec<f64>> {
        if end <= start {
            return Err(Error::InvalidRange { start, end });
        }
        let resolution = if resolution == 0 {
            None
        } else {
            Some(Resolution::new(resolution)?)
        };

        let mut covering: Vec<&Interval<Entry>> = self.tree.overlap(start, end);
        covering.sort_by_key(|iv| iv.begin);

        if covering.is_empty() || covering[0].begin > start || covering_has_gap(&covering, end) {
            return Err(Error::QueryNotCovered { start, end });
        }

        let mut out = Vec::new();
        for iv in covering {
            let data = &iv.value.data;
            let clip_start = start.max(data.start);
            let clip_end = end.min(data.end);
            if clip_start >= clip_end {
                continue;
            }
            let start_idx = data.index_of(clip_start);
            let end_idx = data.index_of(clip_end);
            let clipped = &data.series[start_idx..end_idx];

            match resolution {
                None => out.extend_from_slice(clipped),
                Some(target) if target == data.resolution => out.extend_from_slice(clipped),
                Some(target) if data.resolution < target => {
                    // stored finer than requested: group-average into
                    // buckets of `target` width.
                    let bucket_samples = (target.seconds() / data.resolution.seconds()) as usize;
                    out.extend(roll_up(clipped, bucket_samples));
                }
                Some(target) => {
                    // stored coarser than requested: extrapolate.
                    let factor =
                        ((data.resolution.seconds() as f64) / (target.seconds() as f64)).ceil() as usize;
                    out.extend(extrapolate(clipped, factor));
                }
            }
        }

        Ok(out)
    }

    /// The minimal set of disjoint sub-ranges of `[start, end)` that must
    /// be fetched from the backend to satisfy a query at `resolution`:
    /// gaps (nothing cached) and regions cached at a coarser-than-requested
    /// resolution.
    ///
    /// Interior gaps between non-contiguous cached overlaps are enumerated
    /// too, not just the left/right edges, in case a cache is ever built up
    /// through a path other than [`Self::merge`] that leaves covered regions
    /// non-contiguous.
    pub fn missing_ranges(
        &self,
        start: i64,
        end: i64,
        resolution: Resolution,
    ) -> Result<Vec<(i64, i64, Resolution)>> {
        if end <= start {
            return Err(Error::InvalidRange { start, end });
        }

        let mut overlaps: Vec<&Interval<Entry>> = self.tree.overlap(start, end);
        overlaps.sort_by_key(|iv| iv.begin);

        if overlaps.is_empty() {
            return Ok(vec![(start, end, resolution)]);
        }

        let mut missing = Vec::new();

        if start < overlaps[0].begin {
            missing.push((start, overlaps[0].begin, resolution));
        }

        for (i, iv) in overlaps.iter().enumerate() {
            let clip_start = start.max(iv.begin);
            let clip_end = end.min(iv.end);
            if iv.value.data.resolution > resolution && clip_start < clip_end {
                missing.push((clip_start, clip_end, resolution));
            }
            if i + 1 < overlaps.len() {
                let next = overlaps[i + 1];
                if iv.end < next.begin {
                    missing.push((iv.end, next.begin, resolution));
                }
            }
        }

        let last_end = overlaps.last().unwrap().end;
        if last_end < end {
            missing.push((last_end, end, resolution));
        }

        missing.sort_by_key(|(s, _, _)| *s);
        Ok(missing)
    }
}

fn covering_has_gap<V>(covering: &[&Interval<V>], end: i64) -> bool {
    for pair in covering.windows(2) {
        if pair[0].end < pair[1].begin {
            return true;
        }
    }
    covering.last().map(|iv| iv.end < end).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize, from: f64) -> Vec<f64> {
        (0..n).map(|i| from + i as f64).collect()
    }

    #[test]
    fn merge_then_query_round_trips() {
        let mut cache = ChartCache::new();
        let data = series(60, 20.0);
        cache.merge(0, 3600, Resolution::MINUTE, data.clone()).unwrap();
        assert_eq!(cache.query(0, 3600, 60).unwrap(), data);
    }

    #[test]
    fn merge_rejects_unaligned_and_mismatched() {
        let mut cache = ChartCache::new();
        assert!(matches!(
            cache.merge(10, 3600, Resolution::MINUTE, series(59, 0.0)),
            Err(Error::UnalignedRange { .. })
        ));
        assert!(matches!(
            cache.merge(0, 3600, Resolution::MINUTE, series(59, 0.0)),
            Err(Error::DataLengthMismatch { .. })
        ));
        assert!(matches!(
            cache.merge(3600, 0, Resolution::MINUTE, vec![]),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn finer_merge_overrides_coarser_without_downgrading() {
        let mut cache = ChartCache::new();
        cache
            .merge(0, 3600, Resolution::HOUR, vec![10.0])
            .unwrap();
        cache
            .merge(0, 3600, Resolution::MINUTE, series(60, 20.0))
            .unwrap();
        // finer survives
        assert_eq!(cache.query(0, 3600, 60).unwrap(), series(60, 20.0));

        // re-merging the coarser data again must not downgrade the finer data
        cache.merge(0, 3600, Resolution::HOUR, vec![99.0]).unwrap();
        assert_eq!(cache.query(0, 3600, 60).unwrap(), series(60, 20.0));
    }

    #[test]
    fn query_rolls_up_finer_stored_data() {
        let mut cache = ChartCache::new();
        cache.merge(0, 300, Resolution::MINUTE, vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(cache.query(0, 300, 300).unwrap(), vec![3.0]);
    }

    #[test]
    fn query_extrapolates_coarser_stored_data() {
        let mut cache = ChartCache::new();
        cache.merge(0, 3600, Resolution::HOUR, vec![42.0]).unwrap();
        assert_eq!(cache.query(0, 3600, 300).unwrap(), vec![42.0; 12]);
    }

    #[test]
    fn query_over_uncovered_range_fails() {
        let cache = ChartCache::new();
        assert!(matches!(
            cache.query(0, 60, 60),
            Err(Error::QueryNotCovered { .. })
        ));
    }

    #[test]
    fn merge_coalesces_adjacent_equal_resolution_intervals() {
        let mut cache = ChartCache::new();
        cache.merge(0, 60, Resolution::MINUTE, vec![1.0]).unwrap();
        cache.merge(60, 120, Resolution::MINUTE, vec![2.0]).unwrap();
        assert_eq!(cache.query(0, 120, 60).unwrap(), vec![1.0, 2.0]);
        // one coalesced interval, not two
        assert_eq!(cache.tree.len(), 1);
    }

    #[test]
    fn merge_does_not_combine_touching_intervals_of_different_resolution() {
        let mut cache = ChartCache::new();
        // an hour of minute data immediately followed by an hour of
        // hour-resolution data: touching, but must stay separate entries.
        cache.merge(0, 3600, Resolution::MINUTE, series(60, 1.0)).unwrap();
        cache.merge(3600, 7200, Resolution::HOUR, vec![2.0]).unwrap();

        assert_eq!(cache.tree.len(), 2);
        let mut expected = series(60, 1.0);
        expected.extend(extrapolate(&[2.0], 60));
        assert_eq!(cache.query(0, 7200, 60).unwrap(), expected);
    }

    #[test]
    fn pre_existing_cached_data_wins_a_resolution_tie_over_a_later_overlapping_merge() {
        // mirrors the controller's out-of-order-delivery scenario: a
        // fresher, already-cached reply at [0, 7200) and a stale reply for
        // the overlapping [0, 3600) sub-range arriving later, both at the
        // same resolution. The already-cached data must win.
        let mut cache = ChartCache::new();
        cache.merge(0, 7200, Resolution::FIVE_MINUTE, series(24, 9.0)).unwrap();
        cache.merge(0, 3600, Resolution::FIVE_MINUTE, series(12, 7.0)).unwrap();

        assert_eq!(cache.query(0, 7200, 300).unwrap(), series(24, 9.0));
    }

    #[test]
    fn missing_ranges_empty_cache_is_whole_range() {
        let cache = ChartCache::new();
        assert_eq!(
            cache.missing_ranges(0, 60, Resolution::MINUTE).unwrap(),
            vec![(0, 60, Resolution::MINUTE)]
        );
    }

    #[test]
    fn missing_ranges_s6_fragmented_refetch() {
        let mut cache = ChartCache::new();
        // a month of hourly data, 0 is the epoch anchor for this test
        cache
            .merge(0, 30 * 24 * 3600, Resolution::HOUR, series(30 * 24, 0.0))
            .unwrap();
        // two narrow minute-resolution islands punched into the hourly data
        cache.merge(9 * 300, 10 * 300, Resolution::MINUTE, series(5, 0.0)).unwrap();
        cache.merge(15 * 300, 16 * 300, Resolution::MINUTE, series(5, 0.0)).unwrap();

        // the two islands ([2700, 3000) and [4500, 4800)) already satisfy a
        // minute-resolution query; everything else in range is still only
        // cached at hour resolution and must be refetched.
        let missing = cache
            .missing_ranges(9 * 300, 9 * 300 + 115 * 60, Resolution::MINUTE)
            .unwrap();
        assert_eq!(
            missing,
            vec![
                (10 * 300, 15 * 300, Resolution::MINUTE),
                (16 * 300, 9 * 300 + 115 * 60, Resolution::MINUTE),
            ]
        );
    }

    #[test]
    fn missing_ranges_enumerates_interior_gaps_q1() {
        let mut cache = ChartCache::new();
        cache.merge(0, 60, Resolution::MINUTE, vec![1.0]).unwrap();
        cache.merge(180, 240, Resolution::MINUTE, vec![2.0]).unwrap();

        let missing = cache.missing_ranges(0, 240, Resolution::MINUTE).unwrap();
        assert_eq!(missing, vec![(60, 180, Resolution::MINUTE)]);
    }

    #[test]
    fn interval_data_round_trips_through_json() {
        let data = IntervalData {
            resolution: Resolution::FIVE_MINUTE,
            start: 0,
            end: 900,
            series: vec![1.0, 2.0, 3.0],
        };
        let json = serde_json::to_string(&data).unwrap();
        let back: IntervalData = serde_json::from_str(&json).unwrap();
        assert_eq!(data, back);
    }

    proptest::proptest! {
        #[test]
        fn p4_query_length_matches_range(
            n in 1usize..40,
        ) {
            let mut cache = ChartCache::new();
            let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
            cache.merge(0, (n * 60) as i64, Resolution::MINUTE, data).unwrap();
            let out = cache.query(0, (n * 60) as i64, 60).unwrap();
            proptest::prop_assert_eq!(out.len(), n);
        }
    }
}
