use serde::{Deserialize, Serialize};

/// Points per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub exact_code: u32,
    pub code_group: u32,
    pub exact_sector: u32,
    pub sector_token: u32,
    pub region: u32,
    pub size: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            exact_code: 150,
            code_group: 75,
            exact_sector: 40,
            sector_token: 20,
            region: 30,
            size: 30,
        }
    }
}

impl ScoreWeights {
    /// Highest total a single company can reach.
    pub fn max_total(&self) -> u32 {
        self.exact_code.max(self.code_group)
            + self.exact_sector.max(self.sector_token)
            + self.region
            + self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringRule {
    ExactCode,
    CodeGroup,
    ExactSector,
    SectorToken,
    Region,
    Size,
}

/// A rule that fired, with its points and a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub rule: ScoringRule,
    pub points: u32,
    pub reason: String,
}

/// Stage-2 annotation of one (incentive, company) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicScore {
    pub total: u32,
    pub hits: Vec<RuleHit>,
}

impl DeterministicScore {
    pub(crate) fn push(&mut self, rule: ScoringRule, points: u32, reason: String) {
        self.total += points;
        self.hits.push(RuleHit {
            rule,
            points,
            reason,
        });
    }

    pub fn reasons(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.reason.clone()).collect()
    }

    pub fn has_rule(&self, rule: ScoringRule) -> bool {
        self.hits.iter().any(|h| h.rule == rule)
    }

    /// `total / normalizer`, capped at 1.0.
    pub fn normalized(&self, normalizer: f32) -> f32 {
        if normalizer <= 0.0 {
            return 0.0;
        }
        (self.total as f32 / normalizer).min(1.0)
    }
}
