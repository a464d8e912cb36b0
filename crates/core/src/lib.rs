//! Job matching domain for GoJob.
//!
//! Everything in this crate is pure: store records are shaped by [`prepare`],
//! scored by [`matcher`] and ranked by [`recommend`] without touching I/O.
pub mod matcher;
pub mod prepare;
pub mod recommend;
pub mod types;

pub use matcher::{evaluate, score, MatchBreakdown};
pub use recommend::{recommend, Recommendation, RecommendationView};
pub use types::{CategoryAssignment, ExperienceLevel, JobPosting, MatchScore, SeekerProfile};
