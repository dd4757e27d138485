use std::fmt;

use serde::{Deserialize, Serialize};

/// Funnel states.
///
/// ```text
/// RETRIEVE -> SCORE -> SELECT -> MERGE -> DONE
///                        |         ^
///                        +-> ERROR_FALLBACK
/// ```
///
/// `Retrieve` is left out of a run's path when the vector index could not provide
/// candidates; scoring then covers the full active population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunnelStage {
    Retrieve,
    Score,
    Select,
    ErrorFallback,
    Merge,
    Done,
}

impl FunnelStage {
    pub fn can_advance_to(self, next: FunnelStage) -> bool {
        use FunnelStage::*;
        matches!(
            (self, next),
            (Retrieve, Score)
                | (Score, Select)
                | (Score, Merge)
                | (Select, Merge)
                | (Select, ErrorFallback)
                | (ErrorFallback, Merge)
                | (Merge, Done)
        )
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FunnelStage::Retrieve => "RETRIEVE",
            FunnelStage::Score => "SCORE",
            FunnelStage::Select => "SELECT",
            FunnelStage::ErrorFallback => "ERROR_FALLBACK",
            FunnelStage::Merge => "MERGE",
            FunnelStage::Done => "DONE",
        };
        f.write_str(label)
    }
}

/// Stages visited by one run, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePath(Vec<FunnelStage>);

impl StagePath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `stage`. Returns `false` (and still records it) on an edge the
    /// state machine does not have, so a broken run is visible in diagnostics.
    pub fn enter(&mut self, stage: FunnelStage) -> bool {
        let valid = match self.0.last() {
            Some(current) => current.can_advance_to(stage),
            None => matches!(stage, FunnelStage::Retrieve | FunnelStage::Score),
        };
        self.0.push(stage);
        valid
    }

    pub fn stages(&self) -> &[FunnelStage] {
        &self.0
    }

    pub fn contains(&self, stage: FunnelStage) -> bool {
        self.0.contains(&stage)
    }

    pub fn current(&self) -> Option<FunnelStage> {
        self.0.last().copied()
    }
}

impl fmt::Display for StagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}
