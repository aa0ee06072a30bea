//! Declarative landmark recipes. A shape class is a [`RuleSetCollection`]:
//! for each landmark, one or more [`RuleSet`]s whose masks are intersected by
//! the finder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::landmark::{Landmark, ProfileType};
use crate::ProfileError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    IsZeroIndex,
    IsLocalMinimum { include: bool, window: usize },
    IsLocalMaximum { include: bool, window: usize },
    IsMinimum { include: bool },
    IsMaximum { include: bool },
    /// Index below `ceil(n * proportion)`.
    IndexIsLessThan { proportion: f64 },
    /// Index at or above `floor(n * proportion)`.
    IndexIsMoreThan { proportion: f64 },
    ValueIsLessThan { value: f64 },
    ValueIsMoreThan { value: f64 },
    /// First run of at least `window` values within `value ± tolerance`.
    IsConstantRegion {
        value: f64,
        window: usize,
        tolerance: f64,
    },
    FirstTrue { include: bool },
    LastTrue { include: bool },
}

/// Ordered rules evaluated against one profile type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub profile_type: ProfileType,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(profile_type: ProfileType) -> Self {
        Self {
            profile_type,
            rules: Vec::new(),
        }
    }

    pub fn with(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Where non-reference landmarks are searched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleApplicationType {
    /// Find the landmark once in the median and best-fit every nucleus to it.
    #[default]
    ViaMedian,
    /// Run the rules against each nucleus' own profiles.
    PerNucleus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSetCollection {
    pub name: String,
    #[serde(default)]
    pub application: RuleApplicationType,
    rules: BTreeMap<Landmark, Vec<RuleSet>>,
}

impl RuleSetCollection {
    pub fn new(name: impl Into<String>, application: RuleApplicationType) -> Self {
        Self {
            name: name.into(),
            application,
            rules: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, landmark: Landmark, ruleset: RuleSet) {
        self.rules.entry(landmark).or_default().push(ruleset);
    }

    pub fn with(mut self, landmark: Landmark, ruleset: RuleSet) -> Self {
        self.add(landmark, ruleset);
        self
    }

    pub fn rulesets(&self, landmark: Landmark) -> &[RuleSet] {
        self.rules.get(&landmark).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_rules(&self, landmark: Landmark) -> bool {
        !self.rulesets(landmark).is_empty()
    }

    /// Landmarks with rules, in declaration-independent landmark order.
    pub fn landmarks(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.rules
            .iter()
            .filter(|(_, sets)| !sets.is_empty())
            .map(|(lm, _)| *lm)
    }

    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let collection: RuleSetCollection =
            serde_json::from_str(json).map_err(|e| ProfileError::Config(e.to_string()))?;
        if !collection.has_rules(Landmark::ReferencePoint) {
            return Err(ProfileError::Config(format!(
                "rule collection '{}' has no reference point rules",
                collection.name
            )));
        }
        Ok(collection)
    }

    pub fn to_json(&self) -> Result<String, ProfileError> {
        serde_json::to_string_pretty(self).map_err(|e| ProfileError::Config(e.to_string()))
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rodent" | "rodent_sperm" | "mouse" | "mouse_sperm" => Some(Self::rodent_sperm()),
            "pig" | "pig_sperm" => Some(Self::pig_sperm()),
            "round" => Some(Self::round()),
            _ => None,
        }
    }

    /// Hook-shaped rodent sperm: the RP is the sharpest point of the hook, the
    /// OP the deepest notch in the middle of the border and the verticals
    /// bound the flat stretch of the dorsal edge.
    pub fn rodent_sperm() -> Self {
        let flat = Rule::IsConstantRegion {
            value: 180.0,
            window: 10,
            tolerance: 2.0,
        };
        Self::new("Rodent sperm", RuleApplicationType::ViaMedian)
            .with(
                Landmark::ReferencePoint,
                RuleSet::new(ProfileType::Angle).with(Rule::IsMinimum { include: true }),
            )
            .with(
                Landmark::OrientationPoint,
                RuleSet::new(ProfileType::Angle)
                    .with(Rule::IsLocalMinimum {
                        include: true,
                        window: 5,
                    })
                    .with(Rule::IndexIsMoreThan { proportion: 0.2 })
                    .with(Rule::IndexIsLessThan { proportion: 0.6 })
                    .with(Rule::IsMinimum { include: true }),
            )
            .with(
                Landmark::TopVertical,
                RuleSet::new(ProfileType::Angle)
                    .with(flat.clone())
                    .with(Rule::FirstTrue { include: true }),
            )
            .with(
                Landmark::BottomVertical,
                RuleSet::new(ProfileType::Angle)
                    .with(flat)
                    .with(Rule::LastTrue { include: true }),
            )
    }

    /// Paddle-shaped pig sperm: the RP is the highest reflex peak at the tail
    /// socket.
    pub fn pig_sperm() -> Self {
        Self::new("Pig sperm", RuleApplicationType::ViaMedian).with(
            Landmark::ReferencePoint,
            RuleSet::new(ProfileType::Angle)
                .with(Rule::IsLocalMaximum {
                    include: true,
                    window: 5,
                })
                .with(Rule::ValueIsMoreThan { value: 180.0 })
                .with(Rule::IsMaximum { include: true }),
        )
    }

    /// Round nuclei: RP and OP both sit at the longest diameter.
    pub fn round() -> Self {
        let longest = RuleSet::new(ProfileType::Diameter).with(Rule::IsMaximum { include: true });
        Self::new("Round", RuleApplicationType::ViaMedian)
            .with(Landmark::ReferencePoint, longest.clone())
            .with(Landmark::OrientationPoint, longest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_resolve_by_name() {
        assert_eq!(RuleSetCollection::preset("mouse").unwrap().name, "Rodent sperm");
        assert_eq!(RuleSetCollection::preset("PIG").unwrap().name, "Pig sperm");
        assert!(RuleSetCollection::preset("hexagon").is_none());
    }

    #[test]
    fn test_landmark_listing() {
        let rodent = RuleSetCollection::rodent_sperm();
        let landmarks = rodent.landmarks().collect::<Vec<_>>();
        assert_eq!(
            landmarks,
            vec![
                Landmark::ReferencePoint,
                Landmark::OrientationPoint,
                Landmark::TopVertical,
                Landmark::BottomVertical
            ]
        );
        assert!(!RuleSetCollection::pig_sperm().has_rules(Landmark::OrientationPoint));
    }

    #[test]
    fn test_json_round_trip_keeps_rules() {
        let round = RuleSetCollection::round();
        let json = round.to_json().unwrap();
        assert!(json.contains("\"rule\": \"is_maximum\""));
        let parsed = RuleSetCollection::from_json(&json).unwrap();
        assert_eq!(parsed, round);
    }

    #[test]
    fn test_json_without_reference_point_rejected() {
        let json = r#"{"name": "empty", "rules": {}}"#;
        assert!(matches!(
            RuleSetCollection::from_json(json),
            Err(ProfileError::Config(_))
        ));
    }
}
