use serde::Serialize;

use crate::types::{JobPosting, MatchScore, SeekerProfile};

/// Relative weight of each factor in the blended score.
pub const FACTOR_WEIGHTS: FactorWeights = FactorWeights {
    category: 0.60,
    field: 0.30,
    experience: 0.10,
};

/// Any direct category match scores at least this much.
pub const CATEGORY_MATCH_FLOOR: f64 = 75.0;
/// Bonus scaled by the share of the job's categories that match.
pub const CATEGORY_PROPORTION_BONUS: f64 = 25.0;
pub const CATEGORY_SCORE_CAP: f64 = 100.0;

/// Any field match scores at least this much.
pub const FIELD_MATCH_FLOOR: f64 = 40.0;
/// Bonus scaled by the share of the job's fields that match.
pub const FIELD_PROPORTION_BONUS: f64 = 20.0;
/// Field matches never read as a near-perfect fit.
pub const FIELD_SCORE_CAP: f64 = 60.0;

/// Points lost per experience tier of distance.
pub const EXPERIENCE_STEP_PENALTY: f64 = 20.0;

/// Minimum percentage shown once any topical factor fired.
pub const TOPICAL_FLOOR: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub category: f64,
    pub field: f64,
    pub experience: f64,
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.category + self.field + self.experience
    }
}

/// Per-factor explanation of a match percentage.
///
/// A factor is `Some` only when it contributed to the weighted mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchBreakdown {
    pub percentage: MatchScore,
    pub category: Option<f64>,
    pub field: Option<f64>,
    pub experience: Option<f64>,
    /// Weighted mean over contributing factors before rounding.
    pub weighted: f64,
    pub topical_floor_applied: bool,
}

impl MatchBreakdown {
    /// Returns `true` when the category or field factor fired.
    pub fn is_topical(&self) -> bool {
        self.category.is_some() || self.field.is_some()
    }
}

/// Computes the 0..=100 match percentage of `job` for `seeker`.
pub fn score(seeker: &SeekerProfile, job: &JobPosting) -> MatchScore {
    evaluate(seeker, job).percentage
}

/// Computes the match percentage along with the contributing factors.
pub fn evaluate(seeker: &SeekerProfile, job: &JobPosting) -> MatchBreakdown {
    let weights = FACTOR_WEIGHTS;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    let category = category_factor(seeker, job);
    if let Some(value) = category {
        numerator += value * weights.category;
        denominator += weights.category;
    }

    // Fields are a fallback used only without any direct category match.
    let field = match category {
        Some(_) => None,
        None => field_factor(seeker, job),
    };
    if let Some(value) = field {
        numerator += value * weights.field;
        denominator += weights.field;
    }

    let experience = experience_factor(seeker, job);
    if let Some(value) = experience {
        numerator += value * weights.experience;
        denominator += weights.experience;
    }

    let weighted = if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    };

    let topical = category.is_some() || field.is_some();
    let (percentage, topical_floor_applied) = finalize(weighted, topical);

    MatchBreakdown {
        percentage: MatchScore::new(percentage),
        category,
        field,
        experience,
        weighted,
        topical_floor_applied,
    }
}

/// Rounds the weighted mean and applies the topical floor.
fn finalize(weighted: f64, topical: bool) -> (u8, bool) {
    let rounded = weighted.round().clamp(0.0, 100.0) as u8;
    if topical && rounded < TOPICAL_FLOOR {
        (TOPICAL_FLOOR, true)
    } else {
        (rounded, false)
    }
}

fn category_factor(seeker: &SeekerProfile, job: &JobPosting) -> Option<f64> {
    if seeker.preferred_category_ids.is_empty() {
        return None;
    }
    let job_categories = job.category_ids();
    if job_categories.is_empty() {
        return None;
    }

    let matching = job_categories
        .iter()
        .filter(|id| seeker.preferred_category_ids.contains(id))
        .count();
    if matching == 0 {
        return None;
    }

    let proportion = matching as f64 / job_categories.len() as f64;
    Some((CATEGORY_MATCH_FLOOR + proportion * CATEGORY_PROPORTION_BONUS).min(CATEGORY_SCORE_CAP))
}

fn field_factor(seeker: &SeekerProfile, job: &JobPosting) -> Option<f64> {
    if seeker.preferred_field_ids.is_empty() {
        return None;
    }
    let job_fields = job.field_ids();
    if job_fields.is_empty() {
        return None;
    }

    let matching = job_fields
        .iter()
        .filter(|id| seeker.preferred_field_ids.contains(id))
        .count();
    if matching == 0 {
        return None;
    }

    let proportion = matching as f64 / job_fields.len() as f64;
    Some((FIELD_MATCH_FLOOR + proportion * FIELD_PROPORTION_BONUS).min(FIELD_SCORE_CAP))
}

fn experience_factor(seeker: &SeekerProfile, job: &JobPosting) -> Option<f64> {
    let seeker_level = seeker.experience_level?;
    let required = job.required_experience_level?;
    let diff = f64::from(seeker_level.distance(required));
    Some((100.0 - diff * EXPERIENCE_STEP_PENALTY).max(0.0))
}
