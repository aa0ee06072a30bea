//! Quantile aggregates over a population of profiles.

use ndarray::{Array2, Axis};
use ordered_float::OrderedFloat;

use crate::profile::Profile;
use crate::ProfileError;

pub const MEDIAN: f64 = 0.5;
pub const LOWER_QUARTILE: f64 = 0.25;
pub const UPPER_QUARTILE: f64 = 0.75;

/// Per-index statistics over a population of profiles, all interpolated to a
/// common length. One row per individual.
#[derive(Clone, Debug)]
pub struct ProfileAggregate {
    values: Array2<f64>,
}

impl ProfileAggregate {
    pub fn new(profiles: &[Profile], length: usize) -> Result<Self, ProfileError> {
        if profiles.is_empty() {
            return Err(ProfileError::InsufficientData);
        }
        let mut values = Array2::<f64>::zeros((profiles.len(), length));
        for (mut row, profile) in values.axis_iter_mut(Axis(0)).zip(profiles) {
            let resampled = profile.interpolate(length)?;
            row.assign(resampled.values());
        }
        Ok(Self { values })
    }

    pub fn length(&self) -> usize {
        self.values.ncols()
    }

    pub fn count(&self) -> usize {
        self.values.nrows()
    }

    /// Profile of the `q` quantile (0..=1) at every index.
    pub fn quantile(&self, q: f64) -> Result<Profile, ProfileError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(ProfileError::InvalidParameter(format!(
                "quantile {} outside 0..=1",
                q
            )));
        }
        let column_quantiles = self
            .values
            .axis_iter(Axis(1))
            .map(|column| {
                let mut sorted = column.to_vec();
                sorted.sort_by_key(|v| OrderedFloat(*v));
                quantile_of_sorted(&sorted, q)
            })
            .collect::<Vec<_>>();
        Profile::new(column_quantiles)
    }

    pub fn median(&self) -> Result<Profile, ProfileError> {
        self.quantile(MEDIAN)
    }

    /// Every individual's value at `index`.
    pub fn values_at(&self, index: usize) -> Vec<f64> {
        self.values.column(index % self.length()).to_vec()
    }
}

/// Linear interpolation between closest ranks.
pub fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quantile_of_sorted() {
        assert_abs_diff_eq!(quantile_of_sorted(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_abs_diff_eq!(quantile_of_sorted(&[1.0, 2.0, 3.0], 0.5), 2.0);
        assert_abs_diff_eq!(quantile_of_sorted(&[0.0, 10.0], 0.25), 2.5);
        assert_eq!(quantile_of_sorted(&[7.0], 0.9), 7.0);
        assert!(quantile_of_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_median_across_lengths() {
        let profiles = vec![
            Profile::constant(10, 1.0).unwrap(),
            Profile::constant(20, 3.0).unwrap(),
            Profile::constant(15, 8.0).unwrap(),
        ];
        let agg = ProfileAggregate::new(&profiles, 12).unwrap();
        assert_eq!(agg.length(), 12);
        assert_eq!(agg.count(), 3);
        let median = agg.median().unwrap();
        assert_eq!(median.len(), 12);
        assert_abs_diff_eq!(median.get(5), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.quantile(LOWER_QUARTILE).unwrap().get(0), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.quantile(UPPER_QUARTILE).unwrap().get(0), 5.5, epsilon = 1e-12);
        assert_eq!(agg.values_at(3).len(), 3);
        assert!(agg.quantile(1.5).is_err());
    }

    #[test]
    fn test_empty_population_rejected() {
        assert!(matches!(
            ProfileAggregate::new(&[], 10),
            Err(ProfileError::InsufficientData)
        ));
    }
}
