//! The repository port and its adapters.
//!
//! The matching engines reach the drug knowledge graph only through [`DrugRepository`]. Any
//! backing store (graph database, relational store with recursive queries, precomputed index) can
//! implement it as long as the five operations keep their contracts:
//!
//! | operation             | missing input means                                   |
//! |-----------------------|-------------------------------------------------------|
//! | `resolve_names`       | name absent from the result ("no match found")        |
//! | `query_details`       | code absent from the result (caller falls back)       |
//! | `resolve_subs`        | code present with an empty list (fill-or-empty)        |
//! | `fetch_contrasts`     | no fact returned for the pair                         |
//! | `fetch_subs_name_map` | id absent from the result                             |
//!
//! Every call may fail with [`RepositoryError::Unavailable`](crate::RepositoryError); callers do
//! not retry.

pub mod catalogue;

use crate::hierarchy::HierarchyLevel;
use crate::RepositoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An unordered pair of substance identifiers, sent in ascending order by the engines.
pub type SubstancePair = (String, String);

/// Hierarchy lookup result for one queried code.
///
/// Produced by [`DrugRepository::query_details`], keyed by the raw code that was queried. Levels
/// finer than the matched node are blank. The substance level is exposed as a code only when the
/// node maps to exactly one substance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyDetail {
    #[serde(default)]
    pub tpu_code: String,
    #[serde(default)]
    pub tpu_name: String,
    #[serde(default)]
    pub tp_code: String,
    #[serde(default)]
    pub tp_name: String,
    #[serde(default)]
    pub gpu_code: String,
    #[serde(default)]
    pub gpu_name: String,
    #[serde(default)]
    pub gp_code: String,
    #[serde(default)]
    pub gp_name: String,
    #[serde(default)]
    pub vtm_code: String,
    #[serde(default)]
    pub vtm_name: String,
    #[serde(default)]
    pub subs_codes: Vec<String>,
    #[serde(default)]
    pub subs_names: Vec<String>,
    #[serde(default)]
    pub external: bool,
}

impl HierarchyDetail {
    /// Code populated at `level`, if any.
    pub fn code(&self, level: HierarchyLevel) -> Option<&str> {
        let code = match level {
            HierarchyLevel::PackageBrand => &self.tpu_code,
            HierarchyLevel::ProductBrand => &self.tp_code,
            HierarchyLevel::PackageGeneric => &self.gpu_code,
            HierarchyLevel::ProductGeneric => &self.gp_code,
            HierarchyLevel::Moiety => &self.vtm_code,
            HierarchyLevel::Substance => match self.subs_codes.as_slice() {
                [only] => only,
                _ => return None,
            },
        };
        Some(code.as_str()).filter(|c| !c.is_empty())
    }

    /// Name populated at `level`, if any.
    pub fn name(&self, level: HierarchyLevel) -> Option<&str> {
        let name = match level {
            HierarchyLevel::PackageBrand => &self.tpu_name,
            HierarchyLevel::ProductBrand => &self.tp_name,
            HierarchyLevel::PackageGeneric => &self.gpu_name,
            HierarchyLevel::ProductGeneric => &self.gp_name,
            HierarchyLevel::Moiety => &self.vtm_name,
            HierarchyLevel::Substance => {
                self.code(HierarchyLevel::Substance)?;
                return self.subs_names.first().map(String::as_str).filter(|n| !n.is_empty());
            }
        };
        Some(name.as_str()).filter(|n| !n.is_empty())
    }

    /// A copy keeping only `level` and the coarser levels.
    pub fn truncated_to(&self, level: HierarchyLevel) -> HierarchyDetail {
        let mut out = self.clone();
        for finer in HierarchyLevel::ALL
            .into_iter()
            .filter(|l| l.index() < level.index())
        {
            let (code, name) = match finer {
                HierarchyLevel::PackageBrand => (&mut out.tpu_code, &mut out.tpu_name),
                HierarchyLevel::ProductBrand => (&mut out.tp_code, &mut out.tp_name),
                HierarchyLevel::PackageGeneric => (&mut out.gpu_code, &mut out.gpu_name),
                HierarchyLevel::ProductGeneric => (&mut out.gp_code, &mut out.gp_name),
                HierarchyLevel::Moiety => (&mut out.vtm_code, &mut out.vtm_name),
                HierarchyLevel::Substance => continue,
            };
            code.clear();
            name.clear();
        }
        out
    }
}

/// A stored clinical interaction between two substances.
///
/// Facts are returned in their stored orientation; a fact for `(A, B)` also answers `(B, A)`.
/// Absent text fields are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContrastFact {
    pub sub1_id: String,
    #[serde(default)]
    pub sub1_name: String,
    pub sub2_id: String,
    #[serde(default)]
    pub sub2_name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub interaction_detail_en: String,
    #[serde(default)]
    pub interaction_detail_th: String,
    #[serde(default)]
    pub onset: String,
    #[serde(default)]
    pub significance: String,
    #[serde(default)]
    pub management: String,
    #[serde(default)]
    pub discussion: String,
    #[serde(default)]
    pub reference: String,
}

impl ContrastFact {
    /// True if the fact relates `a` and `b`, in either orientation.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.sub1_id == a && self.sub2_id == b) || (self.sub1_id == b && self.sub2_id == a)
    }

    /// Display name the fact carries for `substance_id`, empty if the fact does not involve it.
    pub fn substance_name(&self, substance_id: &str) -> &str {
        if self.sub1_id == substance_id {
            &self.sub1_name
        } else if self.sub2_id == substance_id {
            &self.sub2_name
        } else {
            ""
        }
    }
}

/// Capability contract for resolving names and codes against the drug knowledge graph.
///
/// Implementations acquire whatever session they need per call and release it on every exit
/// path. The engines call each operation at most a fixed number of times per request.
#[async_trait]
pub trait DrugRepository: Send + Sync {
    /// Best-effort free-text resolution of drug names to substance IDs.
    async fn resolve_names(&self, names: &[String])
        -> RepositoryResult<HashMap<String, Vec<String>>>;

    /// Most specific matching node (and every coarser level) for each code that matches.
    async fn query_details(
        &self,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, HierarchyDetail>>;

    /// Substance IDs for every input code; unresolved codes map to an empty list.
    async fn resolve_subs(&self, codes: &[String]) -> RepositoryResult<HashMap<String, Vec<String>>>;

    /// Stored contrast facts for the given substance pairs, in stored orientation.
    async fn fetch_contrasts(&self, pairs: &[SubstancePair]) -> RepositoryResult<Vec<ContrastFact>>;

    /// Display names of the given substance IDs.
    async fn fetch_subs_name_map(
        &self,
        subs_ids: &[String],
    ) -> RepositoryResult<HashMap<String, String>>;
}
