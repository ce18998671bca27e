//! In-memory drug catalogue implementing [`DrugRepository`].
//!
//! The catalogue is a precomputed index loaded once at startup from a YAML file:
//!
//! ```yaml
//! drugs:
//!   - tpu_code: "100001"
//!     tpu_name: "WARAN 5 mg tablet, 100 tablets"
//!     gp_code: "200001"
//!     gp_name: "warfarin sodium 5 mg tablet"
//!     vtm_code: "300001"
//!     vtm_name: "warfarin"
//!     subs_codes: ["400001"]
//!     subs_names: ["warfarin sodium"]
//!     external: false
//! substances:
//!   - id: "400001"
//!     name: "warfarin sodium"
//! contrasts:
//!   - sub1_id: "400001"
//!     sub2_id: "400002"
//!     severity: "Major"
//! ```
//!
//! Each `drugs` entry is one product node carrying every level of its hierarchy. Any level may be
//! blank. Contrast facts are stored in one orientation and answer both.
//!
//! Calls go through a bounded session pool: each operation holds a permit for its duration and
//! the permit is released when the call returns, whatever the outcome.

use crate::hierarchy::HierarchyLevel;
use crate::repositories::{ContrastFact, DrugRepository, HierarchyDetail, SubstancePair};
use crate::{MatchError, MatchResult, RepositoryError, RepositoryResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

// ============================================================================
// CATALOGUE FILE
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogueFile {
    #[serde(default)]
    drugs: Vec<HierarchyDetail>,
    #[serde(default)]
    substances: Vec<SubstanceEntry>,
    #[serde(default)]
    contrasts: Vec<ContrastFact>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubstanceEntry {
    id: String,
    #[serde(default)]
    name: String,
}

/// Parsed, indexed drug knowledge.
#[derive(Debug, Default)]
pub struct Catalogue {
    drugs: Vec<HierarchyDetail>,
    substance_names: BTreeMap<String, String>,
    contrasts: Vec<ContrastFact>,
    contrast_index: HashMap<(String, String), usize>,
}

impl Catalogue {
    /// Parse a catalogue from YAML text.
    ///
    /// This uses `serde_path_to_error` to surface a best-effort "path" (e.g. `drugs[3].gp_code`)
    /// to the failing field when the YAML does not match the catalogue schema.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::CatalogueParse` if:
    /// - the YAML does not match the catalogue schema,
    /// - any unknown keys are present,
    /// - a contrast fact relates a substance to itself.
    pub fn parse(yaml_text: &str) -> MatchResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let file = match serde_path_to_error::deserialize::<_, CatalogueFile>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(MatchError::CatalogueParse(format!(
                    "schema mismatch at {path}: {source}"
                )));
            }
        };

        Self::from_file(file)
    }

    /// Read and parse a catalogue file.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::CatalogueRead` if the file cannot be read, or any error of
    /// [`Catalogue::parse`].
    pub fn load(path: &Path) -> MatchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(MatchError::CatalogueRead)?;
        let catalogue = Self::parse(&text)?;
        tracing::info!(
            "loaded catalogue {}: {} drugs, {} substances, {} contrasts",
            path.display(),
            catalogue.drugs.len(),
            catalogue.substance_names.len(),
            catalogue.contrasts.len()
        );
        Ok(catalogue)
    }

    fn from_file(file: CatalogueFile) -> MatchResult<Self> {
        let mut substance_names = BTreeMap::new();
        for entry in file.substances {
            substance_names.insert(entry.id, entry.name);
        }
        // Drug entries name their substances too; explicit substance entries win.
        for drug in &file.drugs {
            for (i, sid) in drug.subs_codes.iter().enumerate() {
                let name = drug.subs_names.get(i).cloned().unwrap_or_default();
                substance_names.entry(sid.clone()).or_insert(name);
            }
        }

        let mut contrasts = Vec::with_capacity(file.contrasts.len());
        let mut contrast_index = HashMap::new();
        for mut fact in file.contrasts {
            if fact.sub1_id == fact.sub2_id {
                return Err(MatchError::CatalogueParse(format!(
                    "contrast relates substance {} to itself",
                    fact.sub1_id
                )));
            }
            if fact.sub1_name.is_empty() {
                fact.sub1_name = substance_names.get(&fact.sub1_id).cloned().unwrap_or_default();
            }
            if fact.sub2_name.is_empty() {
                fact.sub2_name = substance_names.get(&fact.sub2_id).cloned().unwrap_or_default();
            }
            contrast_index
                .entry(unordered_key(&fact.sub1_id, &fact.sub2_id))
                .or_insert(contrasts.len());
            contrasts.push(fact);
        }

        Ok(Self {
            drugs: file.drugs,
            substance_names,
            contrasts,
            contrast_index,
        })
    }

    /// Most specific match for `code`: the first drug whose code at the finest possible level
    /// equals it, truncated to that level. A substance ID yields a substance-level detail.
    pub fn detail_for(&self, code: &str) -> Option<HierarchyDetail> {
        for level in &HierarchyLevel::ALL[..HierarchyLevel::Substance.index()] {
            if let Some(drug) = self.drugs.iter().find(|d| d.code(*level) == Some(code)) {
                return Some(drug.truncated_to(*level));
            }
        }

        self.is_substance(code).then(|| HierarchyDetail {
            subs_codes: vec![code.to_string()],
            subs_names: vec![self.substance_names.get(code).cloned().unwrap_or_default()],
            ..Default::default()
        })
    }

    /// Every substance reachable from `code` at any level, sorted and unique.
    pub fn substances_for(&self, code: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        for drug in &self.drugs {
            let matches_level = HierarchyLevel::ALL[..HierarchyLevel::Substance.index()]
                .iter()
                .any(|level| drug.code(*level) == Some(code));
            if matches_level {
                out.extend(drug.subs_codes.iter().cloned());
            }
        }
        if self.is_substance(code) {
            out.insert(code.to_string());
        }
        out.into_iter().collect()
    }

    /// Resolve a free-text name to the substances of the best matching entry.
    ///
    /// The first pass looks for an entry with any name or code containing the whole normalised
    /// query; the second accepts an entry whose names contain every query token.
    pub fn resolve_name(&self, name: &str) -> Option<Vec<String>> {
        let query = normalize_query(name).to_lowercase();
        if query.is_empty() {
            return None;
        }

        let whole = |haystack: &[String]| haystack.iter().any(|h| h.contains(&query));
        if let Some(found) = self.find_by_text(whole) {
            return Some(found);
        }

        let tokens: Vec<&str> = query.split(' ').collect();
        let every_token =
            |haystack: &[String]| tokens.iter().all(|t| haystack.iter().any(|h| h.contains(t)));
        self.find_by_text(every_token)
    }

    fn find_by_text(&self, matches: impl Fn(&[String]) -> bool) -> Option<Vec<String>> {
        for drug in self.drugs.iter().filter(|d| !d.subs_codes.is_empty()) {
            if matches(searchable_text(drug).as_slice()) {
                let unique: BTreeSet<String> = drug.subs_codes.iter().cloned().collect();
                return Some(unique.into_iter().collect());
            }
        }
        for (id, name) in &self.substance_names {
            if matches([id.to_lowercase(), name.to_lowercase()].as_slice()) {
                return Some(vec![id.clone()]);
            }
        }
        None
    }

    /// The stored fact relating `a` and `b`, in either orientation.
    pub fn contrast(&self, a: &str, b: &str) -> Option<&ContrastFact> {
        self.contrast_index
            .get(&unordered_key(a, b))
            .map(|&i| &self.contrasts[i])
    }

    pub fn substance_name(&self, id: &str) -> Option<&str> {
        self.substance_names.get(id).map(String::as_str)
    }

    fn is_substance(&self, code: &str) -> bool {
        self.substance_names.contains_key(code)
    }
}

fn unordered_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn searchable_text(drug: &HierarchyDetail) -> Vec<String> {
    let mut text: Vec<String> = HierarchyLevel::ALL[..HierarchyLevel::Substance.index()]
        .iter()
        .flat_map(|level| [drug.code(*level), drug.name(*level)])
        .flatten()
        .map(str::to_lowercase)
        .collect();
    text.extend(drug.subs_codes.iter().map(|s| s.to_lowercase()));
    text.extend(drug.subs_names.iter().map(|s| s.to_lowercase()));
    text
}

/// Cleans a drug name or query string: characters other than letters, digits and whitespace are
/// removed and runs of whitespace collapse to one space.
pub fn normalize_query(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// REPOSITORY ADAPTER
// ============================================================================

/// [`DrugRepository`] backed by an in-memory [`Catalogue`].
#[derive(Clone, Debug)]
pub struct CatalogueRepository {
    catalogue: Arc<Catalogue>,
    sessions: Arc<Semaphore>,
}

impl CatalogueRepository {
    /// Creates a repository allowing at most `pool_size` concurrent sessions.
    pub fn new(catalogue: Catalogue, pool_size: usize) -> Self {
        Self {
            catalogue: Arc::new(catalogue),
            sessions: Arc::new(Semaphore::new(pool_size)),
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Closes the session pool. Every later call fails with `RepositoryError::Unavailable`.
    pub fn close(&self) {
        self.sessions.close();
    }

    async fn session(&self) -> RepositoryResult<SemaphorePermit<'_>> {
        self.sessions
            .acquire()
            .await
            .map_err(|_| RepositoryError::Unavailable("catalogue session pool is closed".into()))
    }
}

#[async_trait]
impl DrugRepository for CatalogueRepository {
    async fn resolve_names(
        &self,
        names: &[String],
    ) -> RepositoryResult<HashMap<String, Vec<String>>> {
        let _session = self.session().await?;
        let mut out = HashMap::new();
        for name in names {
            if let Some(subs) = self.catalogue.resolve_name(name) {
                out.insert(name.clone(), subs);
            }
        }
        Ok(out)
    }

    async fn query_details(
        &self,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, HierarchyDetail>> {
        let _session = self.session().await?;
        Ok(codes
            .iter()
            .filter_map(|code| {
                self.catalogue
                    .detail_for(code)
                    .map(|detail| (code.clone(), detail))
            })
            .collect())
    }

    async fn resolve_subs(
        &self,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, Vec<String>>> {
        let _session = self.session().await?;
        Ok(codes
            .iter()
            .map(|code| (code.clone(), self.catalogue.substances_for(code)))
            .collect())
    }

    async fn fetch_contrasts(
        &self,
        pairs: &[SubstancePair],
    ) -> RepositoryResult<Vec<ContrastFact>> {
        let _session = self.session().await?;
        Ok(pairs
            .iter()
            .filter_map(|(a, b)| self.catalogue.contrast(a, b).cloned())
            .collect())
    }

    async fn fetch_subs_name_map(
        &self,
        subs_ids: &[String],
    ) -> RepositoryResult<HashMap<String, String>> {
        let _session = self.session().await?;
        Ok(subs_ids
            .iter()
            .filter_map(|id| {
                self.catalogue
                    .substance_name(id)
                    .map(|name| (id.clone(), name.to_string()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOGUE: &str = r#"
drugs:
  - tpu_code: "T1"
    tpu_name: "WARAN 5 mg tablet"
    tp_code: "P1"
    tp_name: "WARAN"
    gp_code: "G1"
    gp_name: "warfarin sodium 5 mg tablet"
    vtm_code: "V1"
    vtm_name: "warfarin"
    subs_codes: ["S1"]
    subs_names: ["warfarin sodium"]
  - tpu_code: "T2"
    tpu_name: "ORFARIN 5 mg tablet"
    gp_code: "G1"
    gp_name: "warfarin sodium 5 mg tablet"
    vtm_code: "V1"
    vtm_name: "warfarin"
    subs_codes: ["S1"]
    subs_names: ["warfarin sodium"]
    external: true
  - tpu_code: "T7"
    tpu_name: "AUGMENTIN 625 mg tablet"
    gp_code: "G7"
    gp_name: "amoxicillin + clavulanic acid 500/125 mg tablet"
    subs_codes: ["S8", "S7", "S7"]
    subs_names: ["clavulanic acid", "amoxicillin"]
substances:
  - id: "S2"
    name: "aspirin"
contrasts:
  - sub1_id: "S2"
    sub2_id: "S1"
    severity: "Major"
    management: "Avoid combination"
"#;

    fn catalogue() -> Catalogue {
        Catalogue::parse(CATALOGUE).expect("catalogue should parse")
    }

    #[test]
    fn test_detail_for_picks_most_specific_level() {
        let catalogue = catalogue();

        let detail = catalogue.detail_for("T1").expect("T1 should resolve");
        assert_eq!(detail.tpu_code, "T1");
        assert_eq!(detail.tp_code, "P1");
        assert_eq!(detail.subs_codes, vec!["S1".to_string()]);

        let detail = catalogue.detail_for("G1").expect("G1 should resolve");
        assert_eq!(detail.tpu_code, "", "generic match must not fabricate a package");
        assert_eq!(detail.tp_code, "");
        assert_eq!(detail.gp_code, "G1");
        assert_eq!(detail.vtm_name, "warfarin");
        assert!(!detail.external);

        assert!(catalogue.detail_for("T2").expect("T2").external);
        assert!(catalogue.detail_for("nope").is_none());
    }

    #[test]
    fn test_detail_for_substance_id() {
        let detail = catalogue().detail_for("S2").expect("S2 should resolve");
        assert_eq!(detail.subs_codes, vec!["S2".to_string()]);
        assert_eq!(detail.subs_names, vec!["aspirin".to_string()]);
        assert_eq!(detail.code(HierarchyLevel::Substance), Some("S2"));
        assert_eq!(detail.code(HierarchyLevel::Moiety), None);
    }

    #[test]
    fn test_substances_for_unions_matching_entries() {
        let catalogue = catalogue();
        assert_eq!(catalogue.substances_for("V1"), vec!["S1"]);
        assert_eq!(catalogue.substances_for("T7"), vec!["S7", "S8"]);
        assert_eq!(catalogue.substances_for("S1"), vec!["S1"]);
        assert!(catalogue.substances_for("nope").is_empty());
    }

    #[test]
    fn test_resolve_name_passes() {
        let catalogue = catalogue();
        assert_eq!(
            catalogue.resolve_name("Warfarin!"),
            Some(vec!["S1".to_string()])
        );
        assert_eq!(
            catalogue.resolve_name("clavulanic  amoxicillin"),
            Some(vec!["S7".to_string(), "S8".to_string()]),
            "token pass should match names in any order"
        );
        assert_eq!(catalogue.resolve_name("ASPIRIN"), Some(vec!["S2".to_string()]));
        assert_eq!(catalogue.resolve_name("  ---  "), None);
        assert_eq!(catalogue.resolve_name("ibuprofen"), None);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Para-cetamol   500 mg (tab) "), "Paracetamol 500 mg tab");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_contrast_lookup_and_names() {
        let catalogue = catalogue();
        let fact = catalogue.contrast("S1", "S2").expect("fact should be found reversed");
        assert_eq!(fact.sub1_id, "S2", "stored orientation is preserved");
        assert_eq!(fact.sub1_name, "aspirin");
        assert_eq!(fact.sub2_name, "warfarin sodium");
        assert!(catalogue.contrast("S1", "S7").is_none());
    }

    #[test]
    fn test_parse_reports_failing_path() {
        let err = Catalogue::parse("drugs:\n  - tpu_code: T1\n    colour: red\n")
            .expect_err("unknown field should be rejected");
        match err {
            MatchError::CatalogueParse(msg) => assert!(msg.contains("drugs"), "got {msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_self_contrast() {
        let err = Catalogue::parse("contrasts:\n  - sub1_id: S1\n    sub2_id: S1\n")
            .expect_err("self contrast should be rejected");
        assert!(matches!(err, MatchError::CatalogueParse(_)));
    }

    #[test]
    fn test_load_reads_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("catalogue.yaml");
        std::fs::write(&path, CATALOGUE).expect("should write catalogue");

        let catalogue = Catalogue::load(&path).expect("catalogue should load");
        assert_eq!(catalogue.substance_name("S7"), Some("amoxicillin"));

        let err = Catalogue::load(&temp_dir.path().join("missing.yaml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, MatchError::CatalogueRead(_)));
    }

    #[test]
    fn test_bundled_catalogue_loads() {
        let path = crate::config::resolve_catalogue_path(None).expect("bundled catalogue");
        let catalogue = Catalogue::load(&path).expect("bundled catalogue should parse");

        assert!(catalogue.detail_for("100001").is_some());
        assert!(catalogue.detail_for("100009").expect("external drug").external);
        assert!(catalogue.contrast("150001", "150002").is_some());
        assert_eq!(catalogue.substance_name("150010"), Some("ibuprofen"));
        assert_eq!(
            catalogue.resolve_name("Augmentin"),
            Some(vec!["150005".to_string(), "150006".to_string()])
        );
    }

    #[tokio::test]
    async fn test_repository_contracts() {
        let repo = CatalogueRepository::new(catalogue(), 2);

        let codes = vec!["T1".to_string(), "missing".to_string()];
        let details = repo.query_details(&codes).await.expect("query_details");
        assert!(details.contains_key("T1"));
        assert!(!details.contains_key("missing"), "no match means absent");

        let subs = repo.resolve_subs(&codes).await.expect("resolve_subs");
        assert_eq!(subs["T1"], vec!["S1".to_string()]);
        assert!(subs["missing"].is_empty(), "every code gets an entry");

        let pairs = vec![("S1".to_string(), "S2".to_string())];
        let facts = repo.fetch_contrasts(&pairs).await.expect("fetch_contrasts");
        assert_eq!(facts.len(), 1);

        let names = repo
            .fetch_subs_name_map(&["S2".to_string(), "S99".to_string()])
            .await
            .expect("fetch_subs_name_map");
        assert_eq!(names.get("S2").map(String::as_str), Some("aspirin"));
        assert!(!names.contains_key("S99"));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let repo = CatalogueRepository::new(catalogue(), 1);
        repo.close();

        let err = repo
            .query_details(&["T1".to_string()])
            .await
            .expect_err("closed pool should fail");
        assert!(matches!(err, RepositoryError::Unavailable(_)));
    }
}
