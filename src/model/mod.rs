//! Domain records shared by every funnel stage.
//!
//! Incentives and companies arrive from the record store; [`Match`] rows go back to it.
//! Missing company attributes are `None` and never an error: every signal that reads
//! them degrades to "no match".


use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type IncentiveId = Uuid;
pub type CompanyId = Uuid;

/// Structured eligibility profile produced by the (external) enrichment step.
///
/// `Incentive::profile == None` means "not yet enriched". `Some(profile)` with empty
/// sets means "enriched, but the program names no restriction on that attribute";
/// the scorer treats both the same (no points), the filter in
/// [`IncentiveFilter::only_enriched`] does not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncentiveProfile {
    #[serde(default)]
    pub eligible_sectors: Vec<String>,
    #[serde(default)]
    pub eligible_codes: BTreeSet<String>,
    #[serde(default)]
    pub eligible_regions: Vec<String>,
    #[serde(default)]
    pub eligible_sizes: Vec<String>,
    #[serde(default)]
    pub funding: FundingBounds,
    #[serde(default)]
    pub summary: Option<String>,
}

impl IncentiveProfile {
    pub fn is_code_eligible(&self, code: &str) -> bool {
        self.eligible_codes.contains(code.trim())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingBounds {
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

/// A funding program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incentive {
    pub id: IncentiveId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile: Option<IncentiveProfile>,
}

impl Incentive {
    pub fn new(id: IncentiveId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            profile: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces the whole profile. Partial merges are not supported.
    pub fn with_profile(mut self, profile: IncentiveProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn is_enriched(&self) -> bool {
        self.profile.is_some()
    }
}

/// A candidate business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Company {
    pub fn new(id: CompanyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sector: None,
            codes: Vec::new(),
            activity: None,
            size: None,
            region: None,
            active: true,
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.codes.push(code.into());
        self
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Persisted funnel output for one (incentive, company) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub incentive_id: IncentiveId,
    pub company_id: CompanyId,
    pub score: f32,
    pub reasons: Vec<String>,
    pub rank: u32,
}

/// The complete, ranked match list of one incentive.
///
/// Construction sorts by score (stable, so equal scores keep input order) and assigns
/// ranks `1..=n`; the replace-all write in [`crate::store::MatchStore`] takes this type
/// so a partially ranked list cannot be persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    matches: Vec<Match>,
}

impl MatchSet {
    pub fn from_scored(
        incentive_id: IncentiveId,
        scored: impl IntoIterator<Item = (CompanyId, f32, Vec<String>)>,
    ) -> Self {
        let mut items: Vec<(CompanyId, f32, Vec<String>)> = scored.into_iter().collect();
        items.sort_by(|a, b| b.1.total_cmp(&a.1));

        let matches = items
            .into_iter()
            .enumerate()
            .map(|(i, (company_id, score, reasons))| Match {
                incentive_id,
                company_id,
                score,
                reasons,
                rank: i as u32 + 1,
            })
            .collect();

        Self { matches }
    }

    /// Keeps the `len` best matches; ranks stay `1..=len`.
    pub fn truncate(&mut self, len: usize) {
        self.matches.truncate(len);
    }

    pub fn as_slice(&self) -> &[Match] {
        &self.matches
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// `true` when ranks are exactly `1..=n` and scores never increase with rank.
    pub fn is_well_ranked(&self) -> bool {
        self.matches
            .iter()
            .enumerate()
            .all(|(i, m)| m.rank == i as u32 + 1)
            && self.matches.windows(2).all(|w| w[0].score >= w[1].score)
    }
}

/// Selects which incentives [`crate::funnel::MatchingEngine::match_all`] visits.
#[derive(Debug, Clone)]
pub struct IncentiveFilter {
    pub only_enriched: bool,
    pub ids: Option<Vec<IncentiveId>>,
}

impl Default for IncentiveFilter {
    fn default() -> Self {
        Self {
            only_enriched: true,
            ids: None,
        }
    }
}

impl IncentiveFilter {
    pub fn all() -> Self {
        Self {
            only_enriched: false,
            ids: None,
        }
    }

    pub fn ids(ids: Vec<IncentiveId>) -> Self {
        Self {
            only_enriched: false,
            ids: Some(ids),
        }
    }

    pub fn accepts(&self, incentive: &Incentive) -> bool {
        if self.only_enriched && !incentive.is_enriched() {
            return false;
        }
        match &self.ids {
            Some(ids) => ids.contains(&incentive.id),
            None => true,
        }
    }
}
