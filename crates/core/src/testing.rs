//! Test doubles shared by the core unit tests.

use crate::repositories::{ContrastFact, DrugRepository, HierarchyDetail, SubstancePair};
use crate::wire::DrugRecord;
use crate::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory [`DrugRepository`] that counts calls per operation.
#[derive(Debug, Default)]
pub struct FakeRepository {
    details: HashMap<String, HierarchyDetail>,
    subs: HashMap<String, Vec<String>>,
    names: HashMap<String, Vec<String>>,
    subs_names: HashMap<String, String>,
    contrasts: Vec<ContrastFact>,
    fail: bool,
    resolve_names_calls: AtomicUsize,
    query_details_calls: AtomicUsize,
    resolve_subs_calls: AtomicUsize,
    fetch_contrasts_calls: AtomicUsize,
    fetch_subs_name_map_calls: AtomicUsize,
}

impl FakeRepository {
    /// Registers `code` with a detail mapping to `substances`, and the matching `resolve_subs`
    /// entry.
    pub fn with_drug(mut self, code: &str, substances: &[&str]) -> Self {
        self.details
            .insert(code.to_string(), detail(code, substances));
        self.with_subs(code, substances)
    }

    pub fn with_detail(mut self, code: &str, detail: HierarchyDetail) -> Self {
        self.details.insert(code.to_string(), detail);
        self
    }

    pub fn with_subs(mut self, code: &str, substances: &[&str]) -> Self {
        self.subs.insert(code.to_string(), owned(substances));
        self
    }

    pub fn with_name(mut self, name: &str, substances: &[&str]) -> Self {
        self.names.insert(name.to_string(), owned(substances));
        self
    }

    pub fn with_subs_name(mut self, id: &str, name: &str) -> Self {
        self.subs_names.insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_contrast(mut self, fact: ContrastFact) -> Self {
        self.contrasts.push(fact);
        self
    }

    /// Every call fails with `RepositoryError::Unavailable`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn resolve_names_calls(&self) -> usize {
        self.resolve_names_calls.load(Ordering::SeqCst)
    }

    pub fn query_details_calls(&self) -> usize {
        self.query_details_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_subs_calls(&self) -> usize {
        self.resolve_subs_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_contrasts_calls(&self) -> usize {
        self.fetch_contrasts_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_subs_name_map_calls(&self) -> usize {
        self.fetch_subs_name_map_calls.load(Ordering::SeqCst)
    }

    fn enter(&self, counter: &AtomicUsize) -> RepositoryResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RepositoryError::Unavailable("fake repository is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DrugRepository for FakeRepository {
    async fn resolve_names(
        &self,
        names: &[String],
    ) -> RepositoryResult<HashMap<String, Vec<String>>> {
        self.enter(&self.resolve_names_calls)?;
        Ok(names
            .iter()
            .filter_map(|n| self.names.get(n).map(|s| (n.clone(), s.clone())))
            .collect())
    }

    async fn query_details(
        &self,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, HierarchyDetail>> {
        self.enter(&self.query_details_calls)?;
        Ok(codes
            .iter()
            .filter_map(|c| self.details.get(c).map(|d| (c.clone(), d.clone())))
            .collect())
    }

    async fn resolve_subs(
        &self,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, Vec<String>>> {
        self.enter(&self.resolve_subs_calls)?;
        Ok(codes
            .iter()
            .map(|c| (c.clone(), self.subs.get(c).cloned().unwrap_or_default()))
            .collect())
    }

    async fn fetch_contrasts(
        &self,
        pairs: &[SubstancePair],
    ) -> RepositoryResult<Vec<ContrastFact>> {
        self.enter(&self.fetch_contrasts_calls)?;
        Ok(pairs
            .iter()
            .filter_map(|(a, b)| self.contrasts.iter().find(|f| f.connects(a, b)).cloned())
            .collect())
    }

    async fn fetch_subs_name_map(
        &self,
        subs_ids: &[String],
    ) -> RepositoryResult<HashMap<String, String>> {
        self.enter(&self.fetch_subs_name_map_calls)?;
        Ok(subs_ids
            .iter()
            .filter_map(|id| self.subs_names.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Package-level detail for `code` with a moiety level and the given substances.
pub fn detail(code: &str, substances: &[&str]) -> HierarchyDetail {
    HierarchyDetail {
        tpu_code: code.to_string(),
        tpu_name: format!("{code} package"),
        vtm_code: format!("{code}-vtm"),
        vtm_name: format!("{code} moiety"),
        subs_codes: owned(substances),
        subs_names: substances.iter().map(|s| format!("{s} name")).collect(),
        ..Default::default()
    }
}

/// A contrast fact stored as `(a, b)`.
pub fn contrast(a: &str, b: &str, severity: &str) -> ContrastFact {
    ContrastFact {
        sub1_id: a.to_string(),
        sub1_name: format!("{a} name"),
        sub2_id: b.to_string(),
        sub2_name: format!("{b} name"),
        severity: severity.to_string(),
        management: "Monitor closely".to_string(),
        ..Default::default()
    }
}

pub fn record_with(build: impl FnOnce(&mut DrugRecord)) -> DrugRecord {
    let mut record = DrugRecord::default();
    build(&mut record);
    record
}

pub fn coded(tpu_code: &str) -> DrugRecord {
    record_with(|r| r.tpu_code = Some(tpu_code.to_string()))
}
