//! Fundamental types used across the entire workspace.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Video frame index as emitted by the upstream tracker.
pub type Frame = u64;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

/// Axis-aligned detection box in pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]`, the layout used by autosave files.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box center in pixels.
    pub fn center(&self) -> Point2<f64> {
        Point2::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BBox) -> f64 {
        nalgebra::distance(&self.center(), &other.center())
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Name of the reserved "not an entity of interest" role.
pub const IGNORE_ROLE: &str = "Ignore";

/// Human-assigned entity label of a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Not part of any named entity
    #[default]
    Ignore,
    /// A named participant, e.g. `Target` or a user-defined name
    Named(String),
}

impl Role {
    pub fn named(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Ignore => IGNORE_ROLE,
            Role::Named(name) => name,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Role::Ignore)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == IGNORE_ROLE {
            Role::Ignore
        } else if trimmed.len() == s.len() {
            Role::Named(s)
        } else {
            Role::Named(trimmed.to_string())
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        match r {
            Role::Ignore => IGNORE_ROLE.to_string(),
            Role::Named(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Cast — the role table of "main" entities
// ---------------------------------------------------------------------------

/// Ordered set of the named roles the operator is labelling.
///
/// Only tracks whose role is a cast member count as "main" tracks for noise
/// absorption and role-wise merging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cast {
    members: Vec<String>,
}

impl Default for Cast {
    fn default() -> Self {
        Self::new(["Target", "Confederate_1", "Confederate_2"])
    }
}

impl Cast {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cast = Self { members: Vec::new() };
        for name in names {
            cast.add(name);
        }
        cast
    }

    /// Add a member. Returns false for duplicates and for the reserved name.
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        match Role::from(name.into()) {
            Role::Ignore => false,
            Role::Named(name) => {
                if self.members.contains(&name) {
                    return false;
                }
                self.members.push(name);
                true
            }
        }
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != name);
        before != self.members.len()
    }

    /// True if `role` names a cast member.
    pub fn contains(&self, role: &Role) -> bool {
        match role {
            Role::Ignore => false,
            Role::Named(name) => self.members.iter().any(|m| m == name),
        }
    }

    /// Cast members as roles, in insertion order.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.members.iter().map(|m| Role::Named(m.clone()))
    }

    pub fn names(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
