//! Circular profiles: fixed-length measurement sequences taken around a closed
//! border, plus the boolean masks the rule engine narrows over them.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::ProfileError;

/// Shortest profile that can be interpolated or fitted.
pub const MINIMUM_PROFILE_LENGTH: usize = 3;

/// Wrap a signed index onto a circular sequence of length `len`.
pub fn wrap_index(index: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    index.rem_euclid(len as isize) as usize
}

/// Number of indices covered walking forward from `start` to `end` on a ring of
/// length `len`. Equal positions cover the whole ring.
pub fn circular_span(start: usize, end: usize, len: usize) -> usize {
    match wrap_index(end as isize - start as isize, len) {
        0 => len,
        span => span,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Profile {
    values: Array1<f64>,
}

impl TryFrom<Vec<f64>> for Profile {
    type Error = ProfileError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Profile::new(values)
    }
}

impl From<Profile> for Vec<f64> {
    fn from(profile: Profile) -> Self {
        profile.values.to_vec()
    }
}

impl Profile {
    pub fn new(values: Vec<f64>) -> Result<Self, ProfileError> {
        if values.len() < MINIMUM_PROFILE_LENGTH {
            return Err(ProfileError::InsufficientData);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ProfileError::InvalidParameter(
                "profile values must be finite".into(),
            ));
        }
        Ok(Self {
            values: Array1::from_vec(values),
        })
    }

    pub fn constant(len: usize, value: f64) -> Result<Self, ProfileError> {
        Self::new(vec![value; len])
    }

    fn from_array(values: Array1<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, wrapping in both directions.
    pub fn get(&self, index: isize) -> f64 {
        self.values[wrap_index(index, self.len())]
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// First index holding the maximum value.
    pub fn index_of_max(&self) -> usize {
        self.index_of_max_within(&BooleanProfile::new(self.len(), true))
            .unwrap_or(0)
    }

    /// First index holding the minimum value.
    pub fn index_of_min(&self) -> usize {
        self.index_of_min_within(&BooleanProfile::new(self.len(), true))
            .unwrap_or(0)
    }

    /// First index of the maximum among the indices set in `mask`.
    pub fn index_of_max_within(&self, mask: &BooleanProfile) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for i in mask.true_indices() {
            let v = self.values[i];
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((i, v));
            }
        }
        best.map(|(i, _)| i)
    }

    /// First index of the minimum among the indices set in `mask`.
    pub fn index_of_min_within(&self, mask: &BooleanProfile) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for i in mask.true_indices() {
            let v = self.values[i];
            if best.map_or(true, |(_, b)| v < b) {
                best = Some((i, v));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Nearest index `fraction` of the way round the profile.
    pub fn index_of_fraction(&self, fraction: f64) -> usize {
        wrap_index((self.len() as f64 * fraction).round() as isize, self.len())
    }

    pub fn fraction_of_index(&self, index: usize) -> f64 {
        wrap_index(index as isize, self.len()) as f64 / self.len() as f64
    }

    /// Rotate so that index `i` of the result reads index `i + k` of `self`.
    pub fn offset(&self, k: isize) -> Profile {
        let n = self.len();
        let start = wrap_index(k, n);
        let rotated = (0..n).map(|i| self.values[(i + start) % n]).collect::<Vec<_>>();
        Profile::from_array(Array1::from_vec(rotated))
    }

    /// Circular moving average over `window` points either side.
    pub fn smooth(&self, window: usize) -> Profile {
        if window == 0 {
            return self.clone();
        }
        let n = self.len() as isize;
        let divisor = (2 * window + 1) as f64;
        let smoothed = (0..n)
            .map(|i| {
                let mut sum = self.get(i);
                for k in 1..=window as isize {
                    sum += self.get(i - k) + self.get(i + k);
                }
                sum / divisor
            })
            .collect::<Vec<_>>();
        Profile::from_array(Array1::from_vec(smoothed))
    }

    /// Sum of successive differences across `window` points either side; the
    /// walk telescopes to `a[i + w] - a[i - w]`.
    pub fn deltas(&self, window: usize) -> Profile {
        let w = window.max(1) as isize;
        let n = self.len() as isize;
        let deltas = (0..n)
            .map(|i| self.get(i + w) - self.get(i - w))
            .collect::<Vec<_>>();
        Profile::from_array(Array1::from_vec(deltas))
    }

    /// Indices whose neighbours strictly increase for `window` points in both
    /// directions.
    pub fn local_minima(&self, window: usize) -> BooleanProfile {
        self.local_extrema(window, |outer, inner| outer > inner)
    }

    /// Indices whose neighbours strictly decrease for `window` points in both
    /// directions.
    pub fn local_maxima(&self, window: usize) -> BooleanProfile {
        self.local_extrema(window, |outer, inner| outer < inner)
    }

    pub fn local_minima_below(&self, window: usize, threshold: f64) -> BooleanProfile {
        let mut minima = self.local_minima(window);
        for i in 0..self.len() {
            if self.values[i] >= threshold {
                minima.set(i, false);
            }
        }
        minima
    }

    pub fn local_maxima_above(&self, window: usize, threshold: f64) -> BooleanProfile {
        let mut maxima = self.local_maxima(window);
        for i in 0..self.len() {
            if self.values[i] <= threshold {
                maxima.set(i, false);
            }
        }
        maxima
    }

    fn local_extrema<F>(&self, window: usize, moves_away: F) -> BooleanProfile
    where
        F: Fn(f64, f64) -> bool,
    {
        let w = window.max(1) as isize;
        let n = self.len() as isize;
        let flags = (0..n)
            .map(|i| {
                (1..=w).all(|k| {
                    moves_away(self.get(i - k), self.get(i - k + 1))
                        && moves_away(self.get(i + k), self.get(i + k - 1))
                })
            })
            .collect::<Vec<_>>();
        BooleanProfile::from_vec(flags)
    }

    /// Linear interpolation onto `new_len` points, wrapping past the last value.
    pub fn interpolate(&self, new_len: usize) -> Result<Profile, ProfileError> {
        if new_len < MINIMUM_PROFILE_LENGTH {
            return Err(ProfileError::InvalidParameter(format!(
                "interpolation length {} below minimum {}",
                new_len, MINIMUM_PROFILE_LENGTH
            )));
        }
        if new_len == self.len() {
            return Ok(self.clone());
        }
        let n = self.len();
        let ratio = n as f64 / new_len as f64;
        let resampled = (0..new_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let j0 = (pos.floor() as usize) % n;
                let j1 = (j0 + 1) % n;
                let frac = pos - pos.floor();
                self.values[j0] + (self.values[j1] - self.values[j0]) * frac
            })
            .collect::<Vec<_>>();
        Ok(Profile::from_array(Array1::from_vec(resampled)))
    }

    /// `len` consecutive values starting at `start`, wrapping.
    pub fn subregion(&self, start: usize, len: usize) -> Vec<f64> {
        (0..len)
            .map(|k| self.get(start as isize + k as isize))
            .collect()
    }

    /// Sum of squared differences, interpolating the shorter profile onto the
    /// longer one first.
    pub fn square_difference(&self, other: &Profile) -> Result<f64, ProfileError> {
        let (a, b) = if self.len() >= other.len() {
            (self.clone(), other.interpolate(self.len())?)
        } else {
            (self.interpolate(other.len())?, other.clone())
        };
        Ok(a
            .values
            .iter()
            .zip(b.values.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum())
    }

    /// Offset `k` for which `self.offset(k)` best matches `template`, searching
    /// every rotation.
    pub fn best_fit_offset(&self, template: &Profile) -> Result<usize, ProfileError> {
        self.best_fit_offset_within(template, 0, self.len() as isize)
    }

    /// As [`Profile::best_fit_offset`], restricted to offsets in `min..max`.
    /// The first best-scoring offset wins.
    pub fn best_fit_offset_within(
        &self,
        template: &Profile,
        min: isize,
        max: isize,
    ) -> Result<usize, ProfileError> {
        if max <= min {
            return Err(ProfileError::InvalidParameter(format!(
                "empty offset range {}..{}",
                min, max
            )));
        }
        let template = template.interpolate(self.len())?;
        let n = self.len();
        let t = template.values();
        let mut best = (wrap_index(min, n), f64::INFINITY);
        for k in min..max {
            let start = wrap_index(k, n);
            let mut score = 0.0;
            for (j, tv) in t.iter().enumerate() {
                let d = self.values[(j + start) % n] - tv;
                score += d * d;
            }
            if score < best.1 {
                best = (start, score);
            }
        }
        Ok(best.0)
    }

    /// Join consecutive value runs into one profile.
    pub fn concat(parts: &[Vec<f64>]) -> Result<Profile, ProfileError> {
        Profile::new(parts.iter().flatten().copied().collect())
    }

}

/// Boolean mask over the indices of a profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanProfile {
    values: Vec<bool>,
}

impl BooleanProfile {
    pub fn new(len: usize, value: bool) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn from_vec(values: Vec<bool>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> bool {
        self.values[index]
    }

    pub fn set(&mut self, index: usize, value: bool) {
        let n = self.len();
        self.values[wrap_index(index as isize, n)] = value;
    }

    pub fn and(&self, other: &BooleanProfile) -> BooleanProfile {
        Self::from_vec(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| *a && *b)
                .collect(),
        )
    }

    pub fn or(&self, other: &BooleanProfile) -> BooleanProfile {
        Self::from_vec(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| *a || *b)
                .collect(),
        )
    }

    pub fn invert(&self) -> BooleanProfile {
        Self::from_vec(self.values.iter().map(|v| !v).collect())
    }

    pub fn first_true(&self) -> Option<usize> {
        self.values.iter().position(|v| *v)
    }

    pub fn last_true(&self) -> Option<usize> {
        self.values.iter().rposition(|v| *v)
    }

    pub fn count_true(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }

    pub fn true_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| if *v { Some(i) } else { None })
    }

    /// True when every index set here is also set in `other`.
    pub fn is_subset_of(&self, other: &BooleanProfile) -> bool {
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| !*a || *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(n: usize) -> Profile {
        Profile::new((0..n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn test_wrap_index() {
        assert_eq!(wrap_index(-1, 10), 9);
        assert_eq!(wrap_index(-336, 330), 324);
        assert_eq!(wrap_index(25, 10), 5);
        assert_eq!(wrap_index(3, 0), 0);
    }

    #[test]
    fn test_get_is_circular() {
        let p = ramp(7);
        for i in -20isize..20 {
            assert_eq!(p.get(i), p.get(wrap_index(i, 7) as isize));
        }
        assert_eq!(p.get(7), 0.0);
        assert_eq!(p.get(-1), 6.0);
    }

    #[test]
    fn test_offset_round_trip() {
        let p = Profile::new(vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]).unwrap();
        for k in -10isize..10 {
            assert_eq!(p.offset(k).offset(-k), p);
        }
        let shifted = p.offset(3);
        assert_eq!(shifted.get(0), p.get(3));
        assert_eq!(shifted.get(5), p.get(0));
    }

    #[test]
    fn test_short_profile_rejected() {
        assert!(matches!(
            Profile::new(vec![1.0, 2.0]),
            Err(ProfileError::InsufficientData)
        ));
        assert!(Profile::new(vec![1.0, f64::NAN, 2.0]).is_err());
    }

    #[test]
    fn test_json_validated_like_new() {
        let p = ramp(5);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[0.0,1.0,2.0,3.0,4.0]");
        assert_eq!(serde_json::from_str::<Profile>(&json).unwrap(), p);
        assert!(serde_json::from_str::<Profile>("[]").is_err());
        assert!(serde_json::from_str::<Profile>("[1.0, 2.0]").is_err());
    }

    #[test]
    fn test_fraction_and_index() {
        let p = ramp(160);
        assert_eq!(p.index_of_fraction(0.25), 40);
        assert_eq!(p.index_of_fraction(0.999), 0);
        assert_eq!(p.index_of_fraction(-0.25), 120);
        assert_abs_diff_eq!(p.fraction_of_index(56), 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(p.fraction_of_index(216), 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_smooth_wraps() {
        let p = Profile::new(vec![0.0, 0.0, 0.0, 0.0, 5.0]).unwrap();
        let s = p.smooth(1);
        assert_abs_diff_eq!(s.get(0), 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.get(3), 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.get(1), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deltas_of_ramp() {
        let p = ramp(20);
        let d = p.deltas(2);
        assert_abs_diff_eq!(d.get(10), 4.0, epsilon = 1e-12);
        // the wrap from 19 back to 0 shows up as a large negative step
        assert!(d.get(0) < 0.0);
    }

    #[test]
    fn test_local_minima_and_maxima() {
        let values = (0..40)
            .map(|i| ((i as f64) * std::f64::consts::TAU / 40.0).cos())
            .collect::<Vec<_>>();
        let p = Profile::new(values).unwrap();
        let minima = p.local_minima(3);
        let maxima = p.local_maxima(3);
        assert_eq!(minima.true_indices().collect::<Vec<_>>(), vec![20]);
        assert_eq!(maxima.true_indices().collect::<Vec<_>>(), vec![0]);
        assert_eq!(p.local_minima_below(3, -2.0).count_true(), 0);
        assert_eq!(p.local_maxima_above(3, 0.5).count_true(), 1);
    }

    #[test]
    fn test_interpolate_preserves_shape() {
        let p = Profile::new(vec![0.0, 2.0, 4.0, 6.0]).unwrap();
        let q = p.interpolate(8).unwrap();
        assert_eq!(q.len(), 8);
        assert_abs_diff_eq!(q.get(1), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.get(6), 6.0, epsilon = 1e-12);
        // final point interpolates back towards the first value
        assert_abs_diff_eq!(q.get(7), 3.0, epsilon = 1e-12);
        assert!(p.interpolate(2).is_err());
    }

    #[test]
    fn test_best_fit_offset_recovers_rotation() {
        let values = (0..60)
            .map(|i| (i as f64 * 0.3).sin() * 10.0 + (i as f64 * 0.05).cos())
            .collect::<Vec<_>>();
        let p = Profile::new(values).unwrap();
        let template = p.offset(17);
        assert_eq!(p.best_fit_offset(&template).unwrap(), 17);
        let restricted = p.best_fit_offset_within(&template, -5, 6).unwrap();
        assert!(restricted <= 5 || restricted >= 55);
    }

    #[test]
    fn test_square_difference_interpolates() {
        let a = Profile::constant(10, 2.0).unwrap();
        let b = Profile::constant(5, 1.0).unwrap();
        assert_abs_diff_eq!(a.square_difference(&b).unwrap(), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.square_difference(&a).unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_subregion_and_span() {
        let p = ramp(10);
        assert_eq!(p.subregion(8, 4), vec![8.0, 9.0, 0.0, 1.0]);
        assert_eq!(circular_span(8, 2, 10), 4);
        assert_eq!(circular_span(3, 3, 10), 10);
    }

    #[test]
    fn test_masked_extremes() {
        let p = Profile::new(vec![5.0, 1.0, 3.0, 0.5, 4.0]).unwrap();
        let mut mask = BooleanProfile::new(5, true);
        mask.set(3, false);
        assert_eq!(p.index_of_min(), 3);
        assert_eq!(p.index_of_min_within(&mask), Some(1));
        assert_eq!(p.index_of_max_within(&BooleanProfile::new(5, false)), None);
        assert!(mask.is_subset_of(&BooleanProfile::new(5, true)));
    }
}
