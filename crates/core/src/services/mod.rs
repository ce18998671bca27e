//! Matching engines.
//!
//! Both engines follow the same shape: validate, resolve free-text names, fetch hierarchy details
//! for the union of codes once, enrich each list, match, paginate. Every repository operation is
//! called at most once per phase, whatever the number of records.

pub mod allergy;
pub mod interaction;

use crate::repositories::{DrugRepository, HierarchyDetail};
use crate::wire::DrugRecord;
use crate::MatchResult;
use std::collections::HashMap;

/// Fetches hierarchy details for `codes`, skipping the round-trip when there are none.
async fn fetch_details(
    repo: &dyn DrugRepository,
    codes: &[String],
) -> MatchResult<HashMap<String, HierarchyDetail>> {
    if codes.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(repo.query_details(codes).await?)
}

/// Resolves the free-text names of `lists` in one batch and returns the updated lists.
async fn resolve_free_text(
    repo: &dyn DrugRepository,
    lists: &[&[DrugRecord]],
) -> MatchResult<Vec<Vec<DrugRecord>>> {
    let names = crate::enrichment::unresolved_names(lists.iter().flat_map(|list| list.iter()));
    if names.is_empty() {
        return Ok(lists.iter().map(|list| list.to_vec()).collect());
    }

    let resolved = repo.resolve_names(&names).await?;
    tracing::debug!("resolved {}/{} free-text names", resolved.len(), names.len());
    Ok(lists
        .iter()
        .map(|list| crate::enrichment::apply_resolved_names(list, &resolved))
        .collect())
}
