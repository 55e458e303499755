use std::fmt;

use crate::error::{Error, Result};

const SECONDS_IN_MINUTE: i64 = 60;
const SECONDS_IN_HOUR: i64 = 60 * SECONDS_IN_MINUTE;
const SECONDS_IN_WEEK: i64 = 7 * 24 * SECONDS_IN_HOUR;

/// A validated sample spacing, in seconds. The only legal values are 60,
/// 300 and 3600 — a "finer" resolution is the one with the smaller value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Resolution(i64);

impl Resolution {
    pub const MINUTE: Resolution = Resolution(60);
    pub const FIVE_MINUTE: Resolution = Resolution(300);
    pub const HOUR: Resolution = Resolution(3600);

    pub fn new(seconds: i64) -> Result<Self> {
        match seconds {
            60 | 300 | 3600 => Ok(Resolution(seconds)),
            other => Err(Error::InvalidResolution(other)),
        }
    }

    pub fn seconds(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Resolution {
    type Error = Error;
    fn try_from(value: i64) -> Result<Self> {
        Resolution::new(value)
    }
}

impl From<Resolution> for i64 {
    fn from(r: Resolution) -> i64 {
        r.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// The business rule mapping a window's duration to the resolution it
/// should be rendered/fetched at.
pub fn resolution_for(duration: i64) -> Result<Resolution> {
    if duration < 0 {
        return Err(Error::InvalidDuration(duration));
    }
    if duration < 2 * SECONDS_IN_HOUR {
        Ok(Resolution::MINUTE)
    } else if duration < SECONDS_IN_WEEK {
        Ok(Resolution::FIVE_MINUTE)
    } else {
        Ok(Resolution::HOUR)
    }
}

/// `duration / resolution`, using `resolution_for(duration)` when
/// `resolution` is omitted. Callers guarantee exact divisibility.
pub fn num_datapoints(duration: i64, resolution: Option<Resolution>) -> Result<i64> {
    let resolution = match resolution {
        Some(r) => r,
        None => resolution_for(duration)?,
    };
    Ok(duration / resolution.seconds())
}

/// Partition `samples` into consecutive chunks of `k` (the last chunk may
/// be short) and emit the arithmetic mean of each chunk.
pub fn roll_up(samples: &[f64], k: usize) -> Vec<f64> {
    assert!(k > 0, "roll_up chunk size must be positive");
    samples
        .chunks(k)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect()
}

/// Repeat each sample `k` times consecutively.
pub fn extrapolate(samples: &[f64], k: usize) -> Vec<f64> {
    assert!(k > 0, "extrapolate factor must be positive");
    let mut out = Vec::with_capacity(samples.len() * k);
    for &v in samples {
        out.extend(std::iter::repeat(v).take(k));
    }
    out
}

/// Coarsen (roll up) or refine (extrapolate) `samples` from `old_res` to
/// `new_res`. Both resolutions are already-validated `Resolution` values,
/// so this cannot itself fail — validation happens once, at construction of
/// the `Resolution` values.
pub fn scale(samples: &[f64], old_res: Resolution, new_res: Resolution) -> Vec<f64> {
    if old_res == new_res {
        return samples.to_vec();
    }
    if old_res < new_res {
        roll_up(samples, (new_res.seconds() / old_res.seconds()) as usize)
    } else {
        extrapolate(samples, (old_res.seconds() / new_res.seconds()) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_for_business_rule() {
        assert_eq!(resolution_for(0).unwrap(), Resolution::MINUTE);
        assert_eq!(resolution_for(2 * SECONDS_IN_HOUR - 1).unwrap(), Resolution::MINUTE);
        assert_eq!(resolution_for(2 * SECONDS_IN_HOUR).unwrap(), Resolution::FIVE_MINUTE);
        assert_eq!(resolution_for(SECONDS_IN_WEEK - 1).unwrap(), Resolution::FIVE_MINUTE);
        assert_eq!(resolution_for(SECONDS_IN_WEEK).unwrap(), Resolution::HOUR);
        assert!(matches!(resolution_for(-1), Err(Error::InvalidDuration(-1))));
    }

    #[test]
    fn resolution_rejects_other_values() {
        assert!(matches!(
            Resolution::new(120),
            Err(Error::InvalidResolution(120))
        ));
    }

    #[test]
    fn num_datapoints_uses_rule_by_default() {
        assert_eq!(num_datapoints(3600, None).unwrap(), 60);
        assert_eq!(num_datapoints(3600, Some(Resolution::MINUTE)).unwrap(), 60);
    }

    #[test]
    fn roll_up_averages_chunks_including_short_tail() {
        assert_eq!(roll_up(&[1.0, 2.0, 3.0, 4.0, 5.0], 2), vec![1.5, 3.5, 5.0]);
    }

    #[test]
    fn extrapolate_repeats_each_sample() {
        assert_eq!(extrapolate(&[1.0, 2.0], 3), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn scale_identity_on_equal_resolution() {
        let xs = vec![1.0, 2.0, 3.0];
        assert_eq!(scale(&xs, Resolution::MINUTE, Resolution::MINUTE), xs);
    }

    #[test]
    fn scale_coarsens_via_rollup() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(
            scale(&xs, Resolution::MINUTE, Resolution::FIVE_MINUTE),
            vec![3.0]
        );
    }

    #[test]
    fn scale_refines_via_extrapolate() {
        let xs = vec![1.0, 2.0];
        assert_eq!(
            scale(&xs, Resolution::HOUR, Resolution::FIVE_MINUTE),
            vec![1.0; 12]
                .into_iter()
                .chain(vec![2.0; 12])
                .collect::<Vec<_>>()
        );
    }

    proptest::proptest! {
        #[test]
        fn p5_scale_length(
            xs in proptest::collection::vec(-100.0f64..100.0, 1..50),
        ) {
            let refined = scale(&xs, Resolution::HOUR, Resolution::MINUTE);
            proptest::prop_assert_eq!(refined.len(), xs.len() * 60);

            let coarsened = scale(&xs, Resolution::MINUTE, Resolution::FIVE_MINUTE);
            proptest::prop_assert_eq!(coarsened.len(), (xs.len() as f64 / 5.0).ceil() as usize);

            let same = scale(&xs, Resolution::MINUTE, Resolution::MINUTE);
            proptest::prop_assert_eq!(same.len(), xs.len());
        }

        #[test]
        fn p6_extrapolate_rollup_identity_on_constant_chunks(
            value in -100.0f64..100.0,
            chunks in 1usize..20,
            k in 1usize..8,
        ) {
            let xs: Vec<f64> = std::iter::repeat(value).take(chunks * k).collect();
            let roundtrip = extrapolate(&roll_up(&xs, k), k);
            proptest::prop_assert_eq!(roundtrip, xs);
        }
    }
}
