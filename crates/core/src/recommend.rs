use serde::Serialize;

use crate::matcher::{evaluate, MatchBreakdown};
use crate::types::{JobPosting, MatchScore, SeekerProfile};

/// Minimum match shown in the seeker dashboard summary.
pub const DASHBOARD_SUMMARY_MIN_MATCH: u8 = 20;

/// Minimum match shown on the dedicated recommended-jobs listing.
pub const RECOMMENDED_JOBS_MIN_MATCH: u8 = 25;

/// Surface a recommendation list is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationView {
    DashboardSummary,
    RecommendedJobs,
}

impl RecommendationView {
    pub fn min_match(self) -> MatchScore {
        match self {
            Self::DashboardSummary => MatchScore::new(DASHBOARD_SUMMARY_MIN_MATCH),
            Self::RecommendedJobs => MatchScore::new(RECOMMENDED_JOBS_MIN_MATCH),
        }
    }

    /// Returns the label used for logging/metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DashboardSummary => "dashboard_summary",
            Self::RecommendedJobs => "recommended_jobs",
        }
    }
}

/// A candidate that cleared the view threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation<T> {
    pub item: T,
    pub breakdown: MatchBreakdown,
}

impl<T> Recommendation<T> {
    pub fn score(&self) -> MatchScore {
        self.breakdown.percentage
    }
}

/// Scores every candidate, keeps those at or above the view threshold and
/// orders them by descending score.
///
/// Candidates with equal scores keep their incoming order.
pub fn recommend<T>(
    seeker: &SeekerProfile,
    candidates: impl IntoIterator<Item = (T, JobPosting)>,
    view: RecommendationView,
) -> Vec<Recommendation<T>> {
    let threshold = view.min_match();
    let mut recommendations: Vec<_> = candidates
        .into_iter()
        .map(|(item, job)| Recommendation {
            item,
            breakdown: evaluate(seeker, &job),
        })
        .filter(|recommendation| recommendation.score() >= threshold)
        .collect();

    recommendations.sort_by(|a, b| b.score().cmp(&a.score()));
    recommendations
}
