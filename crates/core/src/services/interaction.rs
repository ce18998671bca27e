//! Drug-drug interaction matching.
//!
//! Current and historical medications are enriched into one substance index. Every unordered pair
//! of distinct substances in the index is checked against the stored contrast facts, and each fact
//! is expanded back into one row per (input record, contrast record) combination. Rows involving
//! an external record are dropped.

use crate::config::MatchConfig;
use crate::constants::INTERACTION_CONTRAST_TYPE;
use crate::enrichment::{
    enrich_records, union_codes, EnrichedBatch, ListKind, RecordRef, SubstanceIndex,
};
use crate::hierarchy::{project_fields, HierarchyLevel};
use crate::pagination::paginate;
use crate::repositories::{ContrastFact, DrugRepository, SubstancePair};
use crate::services::{fetch_details, resolve_free_text};
use crate::validation::{validate_drug_payload, validate_pagination};
use crate::wire::{ContrastItem, ContrastPage, DrugPayload, DrugRecord, SubstanceRef};
use crate::MatchResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Service for drug-drug interaction matching.
#[derive(Clone)]
pub struct InteractionService {
    cfg: Arc<MatchConfig>,
    repo: Arc<dyn DrugRepository>,
}

impl InteractionService {
    pub fn new(cfg: Arc<MatchConfig>, repo: Arc<dyn DrugRepository>) -> Self {
        Self { cfg, repo }
    }

    /// Finds documented interactions between the patient's current and historical medications.
    ///
    /// # Arguments
    ///
    /// * `payload` - Current medications (at least one) and optional history.
    /// * `page` - 1-based page number.
    /// * `row` - Page size.
    ///
    /// # Returns
    ///
    /// The requested page of contrast rows with the total row count.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidInput` if the payload or page request is invalid, or
    /// `MatchError::RepositoryUnavailable` if any repository call fails. No partial result is
    /// returned.
    pub async fn get_interactions(
        &self,
        payload: &DrugPayload,
        page: usize,
        row: usize,
    ) -> MatchResult<ContrastPage> {
        validate_drug_payload(payload)?;
        validate_pagination(page, row)?;
        let started = Instant::now();
        let repo = self.repo.as_ref();
        let attribution = self.cfg.fallback_attribution();

        let currents = payload.drug_currents.clone();
        let histories = resolve_free_text(repo, &[payload.drug_histories.as_slice()])
            .await?
            .pop()
            .unwrap_or_default();

        let codes = union_codes(currents.iter().chain(histories.iter()));
        let details = fetch_details(repo, &codes).await?;
        tracing::debug!("{} codes, {} details", codes.len(), details.len());

        let current =
            enrich_records(repo, ListKind::Current, &currents, &details, attribution).await?;
        let history =
            enrich_records(repo, ListKind::History, &histories, &details, attribution).await?;

        let mut index = current.index.clone();
        index.merge(&history.index);

        let pairs = substance_pairs(&index);
        let facts = if pairs.is_empty() {
            Vec::new()
        } else {
            repo.fetch_contrasts(&pairs).await?
        };
        tracing::debug!("{} substance pairs, {} contrast facts", pairs.len(), facts.len());

        let rows = build_rows(&pairs, &facts, &index, &[&current, &history]);
        let (pagination, data) = paginate(rows, page, row);
        tracing::debug!(
            "interaction matching produced {} rows in {:?}",
            pagination.total,
            started.elapsed()
        );

        Ok(ContrastPage { pagination, data })
    }
}

/// Every unordered pair of distinct substances in the index, in ascending ID order.
pub fn substance_pairs(index: &SubstanceIndex) -> Vec<SubstancePair> {
    let substances: Vec<&str> = index.substances().collect();
    let mut pairs = Vec::new();
    for (i, a) in substances.iter().enumerate() {
        for b in &substances[i + 1..] {
            pairs.push((a.to_string(), b.to_string()));
        }
    }
    pairs
}

fn build_rows(
    pairs: &[SubstancePair],
    facts: &[ContrastFact],
    index: &SubstanceIndex,
    batches: &[&EnrichedBatch],
) -> Vec<ContrastItem> {
    let mut by_pair: HashMap<(&str, &str), &ContrastFact> = HashMap::new();
    for fact in facts {
        by_pair
            .entry((fact.sub1_id.as_str(), fact.sub2_id.as_str()))
            .or_insert(fact);
        by_pair
            .entry((fact.sub2_id.as_str(), fact.sub1_id.as_str()))
            .or_insert(fact);
    }

    let lookup = |record: RecordRef| batches.iter().find_map(|batch| batch.get(record));

    let mut rows = Vec::new();
    for (a, b) in pairs {
        let Some(fact) = by_pair.get(&(a.as_str(), b.as_str())) else {
            continue;
        };
        for input in index.records(a).iter().filter_map(|r| lookup(*r)) {
            for contrast in index.records(b).iter().filter_map(|r| lookup(*r)) {
                if input.external || contrast.external {
                    continue;
                }
                rows.push(contrast_row(input, contrast, fact, a, b));
            }
        }
    }
    rows
}

fn contrast_row(
    input: &DrugRecord,
    contrast: &DrugRecord,
    fact: &ContrastFact,
    input_substance: &str,
    contrast_substance: &str,
) -> ContrastItem {
    use HierarchyLevel::*;

    let i = project_fields("input", input);
    let c = project_fields("contrast", contrast);

    ContrastItem {
        ref_id: Uuid::new_v4().to_string(),

        input_tpu_code: i.code(PackageBrand).to_string(),
        input_tpu_name: i.name(PackageBrand).to_string(),
        input_tp_code: i.code(ProductBrand).to_string(),
        input_tp_name: i.name(ProductBrand).to_string(),
        input_gpu_code: i.code(PackageGeneric).to_string(),
        input_gpu_name: i.name(PackageGeneric).to_string(),
        input_gp_code: i.code(ProductGeneric).to_string(),
        input_gp_name: i.name(ProductGeneric).to_string(),
        input_vtm_code: i.code(Moiety).to_string(),
        input_vtm_name: i.name(Moiety).to_string(),
        input_subs_code: i.code(Substance).to_string(),
        input_subs_name: i.name(Substance).to_string(),
        input_description: i.description().to_string(),

        contrast_tpu_code: c.code(PackageBrand).to_string(),
        contrast_tpu_name: c.name(PackageBrand).to_string(),
        contrast_tp_code: c.code(ProductBrand).to_string(),
        contrast_tp_name: c.name(ProductBrand).to_string(),
        contrast_gpu_code: c.code(PackageGeneric).to_string(),
        contrast_gpu_name: c.name(PackageGeneric).to_string(),
        contrast_gp_code: c.code(ProductGeneric).to_string(),
        contrast_gp_name: c.name(ProductGeneric).to_string(),
        contrast_vtm_code: c.code(Moiety).to_string(),
        contrast_vtm_name: c.name(Moiety).to_string(),
        contrast_subs_code: c.code(Substance).to_string(),
        contrast_subs_name: c.name(Substance).to_string(),
        contrast_description: c.description().to_string(),

        contrast_type: INTERACTION_CONTRAST_TYPE,

        interaction_detail_en: fact.interaction_detail_en.clone(),
        interaction_detail_th: fact.interaction_detail_th.clone(),
        onset: fact.onset.clone(),
        severity: fact.severity.clone(),
        documentation: fact.documentation.clone(),
        significance: fact.significance.clone(),
        management: fact.management.clone(),
        discussion: fact.discussion.clone(),
        reference: fact.reference.clone(),

        input_substances: vec![substance_ref(fact, input_substance)],
        contrast_substances: vec![substance_ref(fact, contrast_substance)],
    }
}

fn substance_ref(fact: &ContrastFact, substance: &str) -> SubstanceRef {
    SubstanceRef {
        code: substance.to_string(),
        name: fact.substance_name(substance).to_string(),
    }
}
