use tracing::trace;

use super::types::{DeterministicScore, ScoreWeights, ScoringRule};
use crate::model::{Company, IncentiveProfile};

/// Sector tokens shorter than this are ignored ("de", "of", "&").
const MIN_SECTOR_TOKEN_LEN: usize = 3;
const CODE_GROUP_LEN: usize = 2;

/// Pure rule-table scorer; holds no state besides its weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicScorer {
    weights: ScoreWeights,
}

impl DeterministicScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Scores one company. `None` profile (not enriched) scores zero.
    pub fn score(
        &self,
        profile: Option<&IncentiveProfile>,
        company: &Company,
    ) -> DeterministicScore {
        let mut score = DeterministicScore::default();
        let Some(profile) = profile else {
            return score;
        };

        self.score_codes(profile, company, &mut score);
        self.score_sector(profile, company, &mut score);

        if let Some(region) = non_empty(company.region.as_deref())
            && contains_ignore_case(&profile.eligible_regions, region)
        {
            score.push(
                ScoringRule::Region,
                self.weights.region,
                format!("Region {region} is targeted"),
            );
        }

        if let Some(size) = non_empty(company.size.as_deref())
            && contains_ignore_case(&profile.eligible_sizes, size)
        {
            score.push(
                ScoringRule::Size,
                self.weights.size,
                format!("Company size {size} is eligible"),
            );
        }

        trace!(company_id = %company.id, total = score.total, "Scored company");
        score
    }

    fn score_codes(
        &self,
        profile: &IncentiveProfile,
        company: &Company,
        score: &mut DeterministicScore,
    ) {
        if profile.eligible_codes.is_empty() {
            return;
        }

        let codes: Vec<&str> = company
            .codes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        if let Some(code) = codes.iter().find(|c| profile.is_code_eligible(c)) {
            score.push(
                ScoringRule::ExactCode,
                self.weights.exact_code,
                format!("Code {code} is eligible"),
            );
            return;
        }

        for code in &codes {
            let group = code_group(code);
            if let Some(eligible) = profile
                .eligible_codes
                .iter()
                .find(|e| code_group(e.trim()) == group)
            {
                score.push(
                    ScoringRule::CodeGroup,
                    self.weights.code_group,
                    format!("Code {code} is in the same group as eligible code {eligible}"),
                );
                return;
            }
        }
    }

    fn score_sector(
        &self,
        profile: &IncentiveProfile,
        company: &Company,
        score: &mut DeterministicScore,
    ) {
        let Some(sector) = non_empty(company.sector.as_deref()) else {
            return;
        };
        if profile.eligible_sectors.is_empty() {
            return;
        }

        if let Some(label) = profile
            .eligible_sectors
            .iter()
            .find(|label| label.trim().to_lowercase() == sector.to_lowercase())
        {
            score.push(
                ScoringRule::ExactSector,
                self.weights.exact_sector,
                format!("Sector {sector} matches eligible sector {}", label.trim()),
            );
            return;
        }

        let company_tokens = sector_tokens(sector);
        if let Some(label) = profile
            .eligible_sectors
            .iter()
            .find(|label| sector_tokens(label).iter().any(|t| company_tokens.contains(t)))
        {
            score.push(
                ScoringRule::SectorToken,
                self.weights.sector_token,
                format!("Sector {sector} overlaps eligible sector {}", label.trim()),
            );
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystack.iter().any(|h| h.trim().to_lowercase() == needle)
}

/// The two-digit division of a code; shorter codes are their own group.
fn code_group(code: &str) -> &str {
    code.get(..CODE_GROUP_LEN).unwrap_or(code)
}

fn sector_tokens(label: &str) -> Vec<String> {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_SECTOR_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}
