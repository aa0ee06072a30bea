//! Rule evaluation. Every rule narrows a running mask, so later rules only see
//! indices that survived earlier ones.

use crate::landmark::ProfileType;
use crate::profile::{wrap_index, BooleanProfile, Profile};
use crate::rules::{Rule, RuleSet};
use crate::ProfileError;

/// Apply one rule to `profile`, narrowing `mask`.
pub fn apply_rule(profile: &Profile, rule: &Rule, mask: &BooleanProfile) -> BooleanProfile {
    let n = profile.len();
    match rule {
        Rule::IsZeroIndex => {
            let mut zero = BooleanProfile::new(n, false);
            zero.set(0, true);
            mask.and(&zero)
        }
        Rule::IsLocalMinimum { include, window } => {
            select(mask, &profile.local_minima(*window), *include)
        }
        Rule::IsLocalMaximum { include, window } => {
            select(mask, &profile.local_maxima(*window), *include)
        }
        Rule::IsMinimum { include } => single(mask, profile.index_of_min_within(mask), *include),
        Rule::IsMaximum { include } => single(mask, profile.index_of_max_within(mask), *include),
        Rule::IndexIsLessThan { proportion } => {
            let limit = (n as f64 * proportion).ceil() as usize;
            mask.and(&BooleanProfile::from_vec((0..n).map(|i| i < limit).collect()))
        }
        Rule::IndexIsMoreThan { proportion } => {
            let limit = (n as f64 * proportion).floor() as usize;
            mask.and(&BooleanProfile::from_vec((0..n).map(|i| i >= limit).collect()))
        }
        Rule::ValueIsLessThan { value } => mask.and(&BooleanProfile::from_vec(
            profile.values().iter().map(|v| v < value).collect(),
        )),
        Rule::ValueIsMoreThan { value } => mask.and(&BooleanProfile::from_vec(
            profile.values().iter().map(|v| v > value).collect(),
        )),
        Rule::IsConstantRegion {
            value,
            window,
            tolerance,
        } => {
            let mut region = BooleanProfile::new(n, false);
            if let Some((start, end)) = constant_region(profile, *value, *tolerance, *window) {
                for i in start..=end {
                    region.set(i, true);
                }
            }
            mask.and(&region)
        }
        Rule::FirstTrue { include } => single(mask, mask.first_true(), *include),
        Rule::LastTrue { include } => single(mask, mask.last_true(), *include),
    }
}

fn select(mask: &BooleanProfile, hits: &BooleanProfile, include: bool) -> BooleanProfile {
    if include {
        mask.and(hits)
    } else {
        mask.and(&hits.invert())
    }
}

fn single(mask: &BooleanProfile, index: Option<usize>, include: bool) -> BooleanProfile {
    match (index, include) {
        (Some(i), true) => {
            let mut only = BooleanProfile::new(mask.len(), false);
            only.set(i, true);
            only
        }
        (Some(i), false) => {
            let mut rest = mask.clone();
            rest.set(i, false);
            rest
        }
        (None, true) => BooleanProfile::new(mask.len(), false),
        (None, false) => mask.clone(),
    }
}

/// Inclusive bounds of the first run of at least `window` values inside
/// `value ± tolerance`.
fn constant_region(
    profile: &Profile,
    value: f64,
    tolerance: f64,
    window: usize,
) -> Option<(usize, usize)> {
    let mut start: Option<usize> = None;
    for (i, v) in profile.values().iter().enumerate() {
        let inside = *v > value - tolerance && *v < value + tolerance;
        match (inside, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= window {
                    return Some((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    start
        .filter(|s| profile.len() - s >= window)
        .map(|s| (s, profile.len() - 1))
}

/// Masks after each rule of `ruleset`, starting with the all-true mask.
pub fn narrowing(profile: &Profile, ruleset: &RuleSet) -> Vec<BooleanProfile> {
    let mut masks = vec![BooleanProfile::new(profile.len(), true)];
    for rule in &ruleset.rules {
        let next = apply_rule(profile, rule, &masks[masks.len() - 1]);
        masks.push(next);
    }
    masks
}

pub fn ruleset_mask(profile: &Profile, ruleset: &RuleSet) -> BooleanProfile {
    ruleset.rules.iter().fold(
        BooleanProfile::new(profile.len(), true),
        |mask, rule| apply_rule(profile, rule, &mask),
    )
}

/// First index matching every rule of `ruleset`.
pub fn identify_index(profile: &Profile, ruleset: &RuleSet) -> Option<usize> {
    ruleset_mask(profile, ruleset).first_true()
}

/// Intersect the masks of several rule sets, each evaluated against the
/// profile of its own type, and return the first common index.
pub fn identify_index_multi<F>(
    rulesets: &[RuleSet],
    mut profile_for: F,
) -> Result<Option<usize>, ProfileError>
where
    F: FnMut(ProfileType) -> Result<Profile, ProfileError>,
{
    let mut combined: Option<BooleanProfile> = None;
    for ruleset in rulesets {
        let profile = profile_for(ruleset.profile_type)?;
        let mask = ruleset_mask(&profile, ruleset);
        combined = Some(match combined {
            None => mask,
            Some(prev) if prev.len() == mask.len() => prev.and(&mask),
            Some(prev) => {
                return Err(ProfileError::InvalidParameter(format!(
                    "rule sets evaluated on profiles of length {} and {}",
                    prev.len(),
                    mask.len()
                )))
            }
        });
    }
    Ok(combined.and_then(|mask| mask.first_true()))
}

/// Intersection point: the border index half a profile away from the
/// orientation point.
pub fn intersection_index(orientation_index: usize, len: usize) -> usize {
    let half = (len as f64 / 2.0).ceil() as isize;
    wrap_index(orientation_index as isize - half, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;
    use crate::rules::RuleSetCollection;

    fn wave(n: usize) -> Profile {
        let values = (0..n)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / n as f64;
                180.0 + 40.0 * (3.0 * t).sin() + 15.0 * t.cos()
            })
            .collect();
        Profile::new(values).unwrap()
    }

    #[test]
    fn test_narrowing_is_monotonic() {
        let profile = wave(120);
        let rulesets = vec![
            RuleSet::new(ProfileType::Angle)
                .with(Rule::IsLocalMinimum {
                    include: true,
                    window: 4,
                })
                .with(Rule::IndexIsMoreThan { proportion: 0.1 })
                .with(Rule::ValueIsLessThan { value: 170.0 })
                .with(Rule::IsMinimum { include: true }),
            RuleSet::new(ProfileType::Angle)
                .with(Rule::ValueIsMoreThan { value: 150.0 })
                .with(Rule::IsLocalMaximum {
                    include: false,
                    window: 2,
                })
                .with(Rule::FirstTrue { include: false })
                .with(Rule::LastTrue { include: false })
                .with(Rule::IndexIsLessThan { proportion: 0.8 }),
            RuleSet::new(ProfileType::Angle)
                .with(Rule::IsConstantRegion {
                    value: 180.0,
                    window: 3,
                    tolerance: 20.0,
                })
                .with(Rule::IsMaximum { include: false })
                .with(Rule::IsZeroIndex),
        ];
        for ruleset in &rulesets {
            let masks = narrowing(&profile, ruleset);
            assert_eq!(masks.len(), ruleset.rules.len() + 1);
            for pair in masks.windows(2) {
                assert!(pair[1].is_subset_of(&pair[0]));
            }
        }
    }

    #[test]
    fn test_lowest_local_minimum_in_window() {
        let profile = wave(120);
        let ruleset = RuleSet::new(ProfileType::Angle)
            .with(Rule::IsLocalMinimum {
                include: true,
                window: 5,
            })
            .with(Rule::IndexIsMoreThan { proportion: 0.2 })
            .with(Rule::IndexIsLessThan { proportion: 0.6 })
            .with(Rule::IsMinimum { include: true });
        let index = identify_index(&profile, &ruleset).unwrap();
        assert!(index >= 24 && index < 72);
        assert!(profile.local_minima(5).get(index));
    }

    #[test]
    fn test_constant_region_bounds() {
        let mut values = vec![100.0; 50];
        for v in values.iter_mut().take(30).skip(12) {
            *v = 180.5;
        }
        values[40] = 179.0;
        let profile = Profile::new(values).unwrap();
        let flat = Rule::IsConstantRegion {
            value: 180.0,
            window: 10,
            tolerance: 2.0,
        };
        let first = RuleSet::new(ProfileType::Angle)
            .with(flat.clone())
            .with(Rule::FirstTrue { include: true });
        let last = RuleSet::new(ProfileType::Angle)
            .with(flat)
            .with(Rule::LastTrue { include: true });
        assert_eq!(identify_index(&profile, &first), Some(12));
        assert_eq!(identify_index(&profile, &last), Some(29));
    }

    #[test]
    fn test_not_found_when_rules_exclude_everything() {
        let profile = wave(60);
        let ruleset = RuleSet::new(ProfileType::Angle)
            .with(Rule::ValueIsMoreThan { value: 1000.0 })
            .with(Rule::IsMaximum { include: true });
        assert_eq!(identify_index(&profile, &ruleset), None);
    }

    #[test]
    fn test_multi_ruleset_intersection() {
        let profile = Profile::new((0..20).map(|i| i as f64).collect()).unwrap();
        let low = RuleSet::new(ProfileType::Angle).with(Rule::IndexIsLessThan { proportion: 0.5 });
        let high = RuleSet::new(ProfileType::Radius).with(Rule::ValueIsMoreThan { value: 6.5 });
        let found = identify_index_multi(&[low.clone(), high], |_| Ok(profile.clone())).unwrap();
        assert_eq!(found, Some(7));

        let short = Profile::new(vec![1.0, 2.0, 3.0]).unwrap();
        let radius = RuleSet::new(ProfileType::Radius).with(Rule::IsZeroIndex);
        let mismatched = identify_index_multi(&[low, radius], |t| {
            Ok(match t {
                ProfileType::Angle => profile.clone(),
                _ => short.clone(),
            })
        });
        assert!(matches!(mismatched, Err(ProfileError::InvalidParameter(_))));
    }

    #[test]
    fn test_round_nucleus_landmarks() {
        let values = (0..300)
            .map(|i| {
                let d = (i as f64 - 42.0).abs().min(300.0 - (i as f64 - 42.0).abs());
                20.0 - d * 0.01
            })
            .collect();
        let diameter = Profile::new(values).unwrap();
        let round = RuleSetCollection::round();
        let rp = identify_index_multi(round.rulesets(Landmark::ReferencePoint), |_| {
            Ok(diameter.clone())
        })
        .unwrap();
        let op = identify_index_multi(round.rulesets(Landmark::OrientationPoint), |_| {
            Ok(diameter.clone())
        })
        .unwrap();
        assert_eq!(rp, Some(42));
        assert_eq!(op, Some(42));
        assert_eq!(intersection_index(42, 300), 192);
    }
}
