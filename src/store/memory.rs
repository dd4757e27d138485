use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{MatchStore, StoreError, StoreResult};
use crate::ledger::InferenceCallRecord;
use crate::model::{Company, Incentive, IncentiveId, Match, MatchSet};

#[derive(Default)]
struct Tables {
    incentives: Vec<Incentive>,
    companies: Vec<Company>,
    matches: HashMap<IncentiveId, Vec<Match>>,
    call_records: Vec<InferenceCallRecord>,
}

/// Store kept in process memory; insertion order is the listing order.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces (by id) an incentive.
    pub fn upsert_incentive(&self, incentive: Incentive) {
        let mut tables = self.tables.write();
        match tables.incentives.iter_mut().find(|i| i.id == incentive.id) {
            Some(existing) => *existing = incentive,
            None => tables.incentives.push(incentive),
        }
    }

    pub fn upsert_company(&self, company: Company) {
        let mut tables = self.tables.write();
        match tables.companies.iter_mut().find(|c| c.id == company.id) {
            Some(existing) => *existing = company,
            None => tables.companies.push(company),
        }
    }

    pub fn with_incentives(self, incentives: impl IntoIterator<Item = Incentive>) -> Self {
        for incentive in incentives {
            self.upsert_incentive(incentive);
        }
        self
    }

    pub fn with_companies(self, companies: impl IntoIterator<Item = Company>) -> Self {
        for company in companies {
            self.upsert_company(company);
        }
        self
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_records(&self) -> Vec<InferenceCallRecord> {
        self.tables.read().call_records.clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("InMemoryStore")
            .field("incentives", &tables.incentives.len())
            .field("companies", &tables.companies.len())
            .field("matched_incentives", &tables.matches.len())
            .finish()
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn get_incentive(&self, id: IncentiveId) -> StoreResult<Option<Incentive>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .incentives
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn list_incentives(&self) -> StoreResult<Vec<Incentive>> {
        self.check()?;
        Ok(self.tables.read().incentives.clone())
    }

    async fn list_active_companies(&self) -> StoreResult<Vec<Company>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .companies
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect())
    }

    async fn replace_matches(
        &self,
        incentive_id: IncentiveId,
        matches: MatchSet,
    ) -> StoreResult<()> {
        self.check()?;
        if !matches.is_well_ranked() {
            return Err(StoreError::WriteFailed(format!(
                "match set for {incentive_id} is not ranked 1..n"
            )));
        }
        self.tables
            .write()
            .matches
            .insert(incentive_id, matches.into_vec());
        Ok(())
    }

    async fn matches_for(&self, incentive_id: IncentiveId) -> StoreResult<Vec<Match>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .matches
            .get(&incentive_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_call_records(&self, records: &[InferenceCallRecord]) -> StoreResult<()> {
        self.check()?;
        self.tables
            .write()
            .call_records
            .extend_from_slice(records);
        Ok(())
    }
}
