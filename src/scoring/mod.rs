//! Deterministic scorer (funnel stage 2).
//!
//! A rule table awards points for structured eligibility signals. Within each
//! category (code, sector, region, size) only the first applicable rule counts, so
//! a company with an exact code match never also collects the code-group points.
//! Missing attributes on either side score zero.

pub mod scorer;
pub mod types;


pub use scorer::DeterministicScorer;
pub use types::{DeterministicScore, RuleHit, ScoreWeights, ScoringRule};
