use std::collections::BTreeSet;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Identifier of a fine-grained job category.
pub type CategoryId = i64;

/// Identifier of a broad field grouping several categories.
pub type FieldId = i64;

/// Ordinal seniority tier shared by seekers and job postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Managerial,
    Executive,
}

impl ExperienceLevel {
    pub const ALL: [Self; 5] = [
        Self::Entry,
        Self::Mid,
        Self::Senior,
        Self::Managerial,
        Self::Executive,
    ];

    /// Returns the persisted identifier (1 = Entry .. 5 = Executive).
    pub fn id(self) -> i64 {
        match self {
            Self::Entry => 1,
            Self::Mid => 2,
            Self::Senior => 3,
            Self::Managerial => 4,
            Self::Executive => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Entry => "Entry",
            Self::Mid => "Mid",
            Self::Senior => "Senior",
            Self::Managerial => "Managerial",
            Self::Executive => "Executive",
        }
    }

    /// Number of tiers separating two levels.
    pub fn distance(self, other: Self) -> u8 {
        self.id().abs_diff(other.id()) as u8
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raised when an identifier does not map onto a known experience level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown experience level id: {0}")]
pub struct UnknownExperienceLevel(pub i64);

impl TryFrom<i64> for ExperienceLevel {
    type Error = UnknownExperienceLevel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|level| level.id() == value)
            .ok_or(UnknownExperienceLevel(value))
    }
}

impl Serialize for ExperienceLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.id())
    }
}

impl<'de> Deserialize<'de> for ExperienceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(D::Error::custom)
    }
}

/// A category tag on a job posting together with the field it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub category_id: CategoryId,
    pub field_id: FieldId,
}

/// Matching-relevant snapshot of a job seeker's stated preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekerProfile {
    pub experience_level: Option<ExperienceLevel>,
    #[serde(default)]
    pub preferred_category_ids: BTreeSet<CategoryId>,
    #[serde(default)]
    pub preferred_field_ids: BTreeSet<FieldId>,
}

/// Matching-relevant projection of a job posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default)]
    pub category_assignments: Vec<CategoryAssignment>,
    pub required_experience_level: Option<ExperienceLevel>,
}

impl JobPosting {
    /// Distinct category identifiers the job was tagged with.
    pub fn category_ids(&self) -> BTreeSet<CategoryId> {
        self.category_assignments
            .iter()
            .map(|assignment| assignment.category_id)
            .collect()
    }

    /// Distinct fields reached through the job's categories.
    pub fn field_ids(&self) -> BTreeSet<FieldId> {
        self.category_assignments
            .iter()
            .map(|assignment| assignment.field_id)
            .collect()
    }
}

/// Match percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchScore(u8);

impl MatchScore {
    pub const MAX: Self = Self(100);

    /// Builds a score, clamping anything above 100.
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for MatchScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for MatchScore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for MatchScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        if raw > 100 {
            return Err(D::Error::custom(format!(
                "match score must be within 0..=100 (got {raw})"
            )));
        }
        Ok(Self(raw))
    }
}
