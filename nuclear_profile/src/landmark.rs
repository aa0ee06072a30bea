//! Border landmarks and the profile types measured along a border.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named semantic points on a nucleus border.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Landmark {
    ReferencePoint,
    OrientationPoint,
    TopVertical,
    BottomVertical,
    IntersectionPoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkKind {
    /// Segment boundaries are forced at core landmarks.
    Core,
    Extended,
}

impl Landmark {
    pub const ALL: [Landmark; 5] = [
        Landmark::ReferencePoint,
        Landmark::OrientationPoint,
        Landmark::TopVertical,
        Landmark::BottomVertical,
        Landmark::IntersectionPoint,
    ];

    pub fn kind(self) -> LandmarkKind {
        match self {
            Landmark::ReferencePoint | Landmark::OrientationPoint => LandmarkKind::Core,
            _ => LandmarkKind::Extended,
        }
    }

    pub fn is_core(self) -> bool {
        self.kind() == LandmarkKind::Core
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Landmark::ReferencePoint => "RP",
            Landmark::OrientationPoint => "OP",
            Landmark::TopVertical => "TV",
            Landmark::BottomVertical => "BV",
            Landmark::IntersectionPoint => "IP",
        }
    }

    pub fn core() -> impl Iterator<Item = Landmark> {
        Self::ALL.into_iter().filter(|l| l.is_core())
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Measurement a profile records at each border point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProfileType {
    Angle,
    Radius,
    Diameter,
    /// Individual segments stretched onto the median segment lengths.
    Franken,
}

impl ProfileType {
    /// Types measured directly from border geometry.
    pub const MEASURED: [ProfileType; 3] =
        [ProfileType::Angle, ProfileType::Radius, ProfileType::Diameter];

    pub fn label(self) -> &'static str {
        match self {
            ProfileType::Angle => "angle",
            ProfileType::Radius => "radius",
            ProfileType::Diameter => "diameter",
            ProfileType::Franken => "franken",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
