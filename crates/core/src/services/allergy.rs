//! Drug-allergy cross-matching.
//!
//! An allergy entry is reported when the substances it resolves to overlap the patient's active
//! substances, i.e. those of current and historical medications. The row's `allergy_type` says
//! where the overlap comes from.

use crate::config::MatchConfig;
use crate::constants::{ALLERGY_TYPE_BOTH, ALLERGY_TYPE_CURRENT, ALLERGY_TYPE_HISTORY};
use crate::enrichment::{enrich_records, ListKind};
use crate::hierarchy::{extract_codes, project_fields, HierarchyLevel};
use crate::pagination::paginate;
use crate::repositories::{DrugRepository, HierarchyDetail};
use crate::services::{fetch_details, resolve_free_text};
use crate::validation::{validate_allergy_payload, validate_pagination};
use crate::wire::{AllergyItem, AllergyPage, AllergyPayload, DrugRecord, SubstanceRef};
use crate::MatchResult;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Service for drug-allergy matching.
#[derive(Clone)]
pub struct AllergyService {
    cfg: Arc<MatchConfig>,
    repo: Arc<dyn DrugRepository>,
}

impl AllergyService {
    pub fn new(cfg: Arc<MatchConfig>, repo: Arc<dyn DrugRepository>) -> Self {
        Self { cfg, repo }
    }

    /// Cross-checks the patient's allergy list against current and historical medications.
    ///
    /// # Arguments
    ///
    /// * `payload` - Current medications and allergies (at least one each) and optional history.
    /// * `page` - 1-based page number.
    /// * `row` - Page size.
    ///
    /// # Returns
    ///
    /// The requested page of allergy rows with the total row count. Allergy entries with no
    /// current or historical correlate are not reported.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidInput` if the payload or page request is invalid, or
    /// `MatchError::RepositoryUnavailable` if any repository call fails.
    pub async fn get_allergy(
        &self,
        payload: &AllergyPayload,
        page: usize,
        row: usize,
    ) -> MatchResult<AllergyPage> {
        validate_allergy_payload(payload)?;
        validate_pagination(page, row)?;
        let started = Instant::now();
        let repo = self.repo.as_ref();
        let attribution = self.cfg.fallback_attribution();

        let currents = payload.drug_currents.clone();
        let mut resolved = resolve_free_text(
            repo,
            &[
                payload.drug_histories.as_slice(),
                payload.drug_allergies.as_slice(),
            ],
        )
        .await?;
        let allergies = resolved.pop().unwrap_or_default();
        let histories = resolved.pop().unwrap_or_default();

        // Codes are extracted once, after name resolution and before enrichment.
        let current_codes = codes_of(&currents);
        let history_codes = codes_of(&histories);
        let allergy_codes = codes_of(&allergies);

        let all_codes: Vec<String> = current_codes
            .iter()
            .chain(&history_codes)
            .chain(&allergy_codes)
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let subs_map = if all_codes.is_empty() {
            HashMap::new()
        } else {
            repo.resolve_subs(&all_codes).await?
        };
        let details = fetch_details(repo, &all_codes).await?;
        tracing::debug!("{} codes, {} details", all_codes.len(), details.len());

        enrich_records(repo, ListKind::Current, &currents, &details, attribution).await?;
        enrich_records(repo, ListKind::History, &histories, &details, attribution).await?;
        let allergy_batch =
            enrich_records(repo, ListKind::Allergy, &allergies, &details, attribution).await?;

        let current_subs = substances_of(&current_codes, &subs_map);
        let history_subs = substances_of(&history_codes, &subs_map);
        let active: Vec<String> = current_subs.union(&history_subs).cloned().collect();

        let names = if active.is_empty() {
            HashMap::new()
        } else {
            repo.fetch_subs_name_map(&active).await?
        };
        tracing::debug!("{} active substances", active.len());

        let mut rows = Vec::new();
        for (record, codes) in allergy_batch.records.iter().zip(&allergy_codes) {
            let overlap: BTreeSet<&String> = allergy_substances(codes, &details)
                .into_iter()
                .filter(|s| current_subs.contains(*s) || history_subs.contains(*s))
                .collect();
            if overlap.is_empty() {
                continue;
            }

            let in_current = overlap.iter().any(|s| current_subs.contains(*s));
            let in_history = overlap.iter().any(|s| history_subs.contains(*s));
            let allergy_type = match (in_current, in_history) {
                (true, true) => ALLERGY_TYPE_BOTH,
                (true, false) => ALLERGY_TYPE_CURRENT,
                _ => ALLERGY_TYPE_HISTORY,
            };
            let substances = overlap
                .into_iter()
                .map(|code| SubstanceRef {
                    code: code.clone(),
                    name: names.get(code).cloned().unwrap_or_default(),
                })
                .collect();

            rows.push(allergy_row(record, allergy_type, substances));
        }

        let (pagination, data) = paginate(rows, page, row);
        tracing::debug!(
            "allergy matching produced {} rows in {:?}",
            pagination.total,
            started.elapsed()
        );

        Ok(AllergyPage { pagination, data })
    }
}

fn codes_of(records: &[DrugRecord]) -> Vec<Vec<String>> {
    records.iter().map(extract_codes).collect()
}

fn substances_of(
    codes: &[Vec<String>],
    subs_map: &HashMap<String, Vec<String>>,
) -> BTreeSet<String> {
    codes
        .iter()
        .flatten()
        .filter_map(|code| subs_map.get(code))
        .flatten()
        .cloned()
        .collect()
}

/// Union of the detail substance sets across all of one record's codes.
fn allergy_substances<'a>(
    codes: &[String],
    details: &'a HashMap<String, HierarchyDetail>,
) -> BTreeSet<&'a String> {
    codes
        .iter()
        .filter_map(|code| details.get(code))
        .flat_map(|detail| detail.subs_codes.iter())
        .collect()
}

fn allergy_row(
    record: &DrugRecord,
    allergy_type: u8,
    substances: Vec<SubstanceRef>,
) -> AllergyItem {
    use HierarchyLevel::*;

    let i = project_fields("input", record);
    AllergyItem {
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
        is_allergy: true,
        allergy_type,
        allergy_substances: substances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FallbackAttribution;
    use crate::testing::{coded, record_with, FakeRepository};
    use crate::MatchError;
    use std::path::PathBuf;

    fn service(repo: Arc<FakeRepository>) -> AllergyService {
        let cfg = MatchConfig::new(PathBuf::from("unused.yaml"), 4, FallbackAttribution::default())
            .expect("config should be valid");
        AllergyService::new(Arc::new(cfg), repo)
    }

    fn payload(
        currents: Vec<DrugRecord>,
        histories: Vec<DrugRecord>,
        allergies: Vec<DrugRecord>,
    ) -> AllergyPayload {
        AllergyPayload {
            drug_currents: currents,
            drug_histories: histories,
            drug_allergies: allergies,
        }
    }

    #[tokio::test]
    async fn test_same_code_current_and_allergy_is_type_current() {
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T1", &["S1"])
                .with_subs_name("S1", "warfarin"),
        );
        let svc = service(repo.clone());

        let page = svc
            .get_allergy(&payload(vec![coded("T1")], vec![], vec![coded("T1")]), 1, 10)
            .await
            .expect("matching should succeed");

        assert_eq!(page.pagination.total, 1);
        let row = &page.data[0];
        assert!(row.is_allergy);
        assert_eq!(row.allergy_type, 0);
        assert_eq!(row.input_tpu_code, "T1");
        assert_eq!(row.input_vtm_code, "T1-vtm");
        assert_eq!(
            row.allergy_substances,
            vec![SubstanceRef {
                code: "S1".into(),
                name: "warfarin".into()
            }]
        );

        assert_eq!(repo.resolve_subs_calls(), 1);
        assert_eq!(repo.query_details_calls(), 1);
        assert_eq!(repo.fetch_subs_name_map_calls(), 1);
        assert_eq!(repo.resolve_names_calls(), 0);
    }

    #[tokio::test]
    async fn test_allergy_type_reflects_overlap_source() {
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T1", &["S1"])
                .with_drug("T2", &["S2"])
                .with_drug("A1", &["S1"])
                .with_drug("A2", &["S2"])
                .with_drug("A12", &["S1", "S2"]),
        );
        let svc = service(repo);

        let page = svc
            .get_allergy(
                &payload(
                    vec![coded("T1")],
                    vec![coded("T2")],
                    vec![coded("A1"), coded("A2"), coded("A12")],
                ),
                1,
                10,
            )
            .await
            .expect("matching should succeed");

        let types: Vec<u8> = page.data.iter().map(|r| r.allergy_type).collect();
        assert_eq!(types, vec![0, 1, 2]);
        let both: Vec<&str> = page.data[2]
            .allergy_substances
            .iter()
            .map(|s| s.code.as_str())
            .collect();
        assert_eq!(both, vec!["S1", "S2"]);
        assert_eq!(page.data[2].allergy_substances[0].name, "", "unknown names are empty");
    }

    #[tokio::test]
    async fn test_allergy_without_overlap_is_not_emitted() {
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T1", &["S1"])
                .with_drug("A9", &["S9"]),
        );
        let svc = service(repo);

        let page = svc
            .get_allergy(&payload(vec![coded("T1")], vec![], vec![coded("A9")]), 1, 10)
            .await
            .expect("matching should succeed");

        assert_eq!(page.pagination.total, 0);
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_allergy_resolved_by_name_only() {
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T3", &["S3"])
                .with_drug("S3", &["S3"])
                .with_name("amoxicillin", &["S3"]),
        );
        let svc = service(repo.clone());
        let by_name = record_with(|r| r.name = Some("amoxicillin".into()));

        let page = svc
            .get_allergy(&payload(vec![coded("T3")], vec![], vec![by_name]), 1, 10)
            .await
            .expect("matching should succeed");

        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].allergy_type, 0);
        assert_eq!(page.data[0].input_subs_code, "S3");
        assert_eq!(repo.resolve_names_calls(), 1);
    }

    #[tokio::test]
    async fn test_active_substances_come_from_resolve_subs() {
        // The detail for T1 knows no substance, the direct lookup does.
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T1", &[])
                .with_subs("T1", &["S1"])
                .with_drug("A1", &["S1"]),
        );
        let svc = service(repo);

        let page = svc
            .get_allergy(&payload(vec![coded("T1")], vec![], vec![coded("A1")]), 1, 10)
            .await
            .expect("matching should succeed");

        assert_eq!(page.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_pagination_and_failure() {
        let repo = Arc::new(
            FakeRepository::default()
                .with_drug("T1", &["S1"])
                .with_drug("A1", &["S1"]),
        );
        let svc = service(repo);
        let request = payload(
            vec![coded("T1")],
            vec![],
            vec![coded("A1"), coded("A1"), coded("A1")],
        );

        let page = svc
            .get_allergy(&request, 2, 2)
            .await
            .expect("matching should succeed");
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.row, 1);
        assert_eq!(page.pagination.page, 2);

        let failing = service(Arc::new(FakeRepository::default().failing()));
        let err = failing
            .get_allergy(&request, 1, 10)
            .await
            .expect_err("failure should propagate");
        assert!(matches!(err, MatchError::RepositoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_allergy_payload_requires_allergies() {
        let svc = service(Arc::new(FakeRepository::default()));
        let err = svc
            .get_allergy(&payload(vec![coded("T1")], vec![], vec![]), 1, 10)
            .await
            .expect_err("empty allergies should fail");
        assert!(matches!(err, MatchError::InvalidInput(_)));
    }
}
