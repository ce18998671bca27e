//! Batch enrichment of drug records against a fetched detail mapping.
//!
//! Enrichment takes the records of one list plus the hierarchy details already fetched for the
//! union of their codes, and produces:
//! - enriched copies of the records (empty hierarchy slots backfilled from the first matching
//!   detail, `external` taken from that detail),
//! - a [`SubstanceIndex`] from substance ID to the records the substance was found in.
//!
//! Inputs are never mutated. Records are referred to by [`RecordRef`] handles so the same record
//! can sit under several substances without aliasing.
//!
//! Records that match nothing in the detail mapping are resolved in one fallback `resolve_subs`
//! call per batch. Which record receives the substances found that way is governed by
//! [`FallbackAttribution`].

use crate::config::FallbackAttribution;
use crate::hierarchy::{extract_codes, non_empty, HierarchyLevel};
use crate::repositories::{DrugRepository, HierarchyDetail};
use crate::wire::DrugRecord;
use crate::MatchResult;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The patient list a record came from. Ordering is the row ordering: current first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListKind {
    Current,
    History,
    Allergy,
}

/// Handle to one record of one list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordRef {
    pub list: ListKind,
    pub position: usize,
}

impl RecordRef {
    pub fn new(list: ListKind, position: usize) -> Self {
        Self { list, position }
    }
}

/// Substance ID to the records it was found in.
///
/// Substances iterate in ascending ID order; each bucket is sorted by `(list, position)` and
/// holds no duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubstanceIndex {
    buckets: BTreeMap<String, Vec<RecordRef>>,
}

impl SubstanceIndex {
    pub fn insert(&mut self, substance: &str, record: RecordRef) {
        let bucket = self.buckets.entry(substance.to_string()).or_default();
        if let Err(at) = bucket.binary_search(&record) {
            bucket.insert(at, record);
        }
    }

    /// Adds every entry of `other` to this index.
    pub fn merge(&mut self, other: &SubstanceIndex) {
        for (substance, records) in &other.buckets {
            for record in records {
                self.insert(substance, *record);
            }
        }
    }

    pub fn substances(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn records(&self, substance: &str) -> &[RecordRef] {
        self.buckets
            .get(substance)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Result of enriching one list.
#[derive(Clone, Debug)]
pub struct EnrichedBatch {
    pub list: ListKind,
    /// Enriched copies, in input order.
    pub records: Vec<DrugRecord>,
    /// Code whose detail each record was enriched from, if any.
    pub matched_codes: Vec<Option<String>>,
    pub index: SubstanceIndex,
}

impl EnrichedBatch {
    /// The enriched record behind `record`, if it belongs to this batch.
    pub fn get(&self, record: RecordRef) -> Option<&DrugRecord> {
        if record.list != self.list {
            return None;
        }
        self.records.get(record.position)
    }
}

/// Enriches `records` of `list` from `details`.
///
/// For each record the extracted codes are tried in level order; the first code present in
/// `details` supplies the backfill, the `external` flag and the substances the record is indexed
/// under. Records with no hit are resolved through a single `resolve_subs` call and get
/// `external = false`.
///
/// # Errors
///
/// Returns `MatchError::RepositoryUnavailable` if the fallback lookup fails.
pub async fn enrich_records(
    repo: &dyn DrugRepository,
    list: ListKind,
    records: &[DrugRecord],
    details: &HashMap<String, HierarchyDetail>,
    attribution: FallbackAttribution,
) -> MatchResult<EnrichedBatch> {
    let mut batch = EnrichedBatch {
        list,
        records: Vec::with_capacity(records.len()),
        matched_codes: Vec::with_capacity(records.len()),
        index: SubstanceIndex::default(),
    };
    let mut unmatched: Vec<(usize, Vec<String>)> = Vec::new();

    for (position, record) in records.iter().enumerate() {
        let codes = extract_codes(record);
        let hit = codes
            .iter()
            .find_map(|code| details.get(code).map(|detail| (code, detail)));

        match hit {
            Some((code, detail)) => {
                for substance in &detail.subs_codes {
                    batch.index.insert(substance, RecordRef::new(list, position));
                }
                batch.records.push(backfill(record, detail));
                batch.matched_codes.push(Some(code.clone()));
            }
            None => {
                let mut copy = record.clone();
                copy.external = false;
                batch.records.push(copy);
                batch.matched_codes.push(None);
                if !codes.is_empty() {
                    unmatched.push((position, codes));
                }
            }
        }
    }

    if !unmatched.is_empty() {
        let fallback_codes: Vec<String> = unmatched
            .iter()
            .flat_map(|(_, codes)| codes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resolved = repo.resolve_subs(&fallback_codes).await?;

        for (position, codes) in &unmatched {
            let target = match attribution {
                FallbackAttribution::FirstRecord => RecordRef::new(list, 0),
                FallbackAttribution::PerRecord => RecordRef::new(list, *position),
            };
            for code in codes {
                for substance in resolved.get(code).into_iter().flatten() {
                    batch.index.insert(substance, target);
                }
            }
        }
        tracing::debug!(
            "{:?}: {} record(s) resolved through fallback ({} codes)",
            list,
            unmatched.len(),
            fallback_codes.len()
        );
    }

    Ok(batch)
}

/// A copy of `record` with every empty hierarchy slot filled from `detail`.
fn backfill(record: &DrugRecord, detail: &HierarchyDetail) -> DrugRecord {
    let mut out = record.clone();
    for level in HierarchyLevel::ALL {
        if let Some(code) = detail.code(level) {
            let slot = level.code_slot_mut(&mut out);
            if non_empty(slot).is_none() {
                *slot = Some(code.to_string());
            }
        }
        if let Some(name) = detail.name(level) {
            let slot = level.name_slot_mut(&mut out);
            if non_empty(slot).is_none() {
                *slot = Some(name.to_string());
            }
        }
    }
    out.external = detail.external;
    out
}

// ============================================================================
// FREE-TEXT NAME RESOLUTION
// ============================================================================

/// True if the record has no code but carries a non-blank free-text name.
pub fn needs_name_resolution(record: &DrugRecord) -> bool {
    extract_codes(record).is_empty()
        && record
            .name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
}

/// Distinct names of the records that need free-text resolution, in first-seen order.
pub fn unresolved_names<'a>(records: impl IntoIterator<Item = &'a DrugRecord>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for record in records {
        if !needs_name_resolution(record) {
            continue;
        }
        if let Some(name) = record.name.as_deref() {
            if seen.insert(name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Copies of `records` with resolved names applied to the records that needed them.
pub fn apply_resolved_names(
    records: &[DrugRecord],
    resolved: &HashMap<String, Vec<String>>,
) -> Vec<DrugRecord> {
    records
        .iter()
        .map(|record| {
            let substances = record
                .name
                .as_deref()
                .filter(|_| needs_name_resolution(record))
                .and_then(|name| resolved.get(name))
                .filter(|subs| !subs.is_empty());
            match substances {
                Some(subs) => with_resolved_name(record, subs),
                None => record.clone(),
            }
        })
        .collect()
}

/// A copy of `record` whose substance slot holds the first candidate and which keeps every
/// candidate for code extraction.
pub fn with_resolved_name(record: &DrugRecord, substances: &[String]) -> DrugRecord {
    let mut out = record.clone();
    out.subs_code = substances.first().cloned();
    out.substance_candidates = substances.to_vec();
    out
}

/// Union of the codes of every record, in first-seen order.
pub fn union_codes<'a>(records: impl IntoIterator<Item = &'a DrugRecord>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut codes = Vec::new();
    for record in records {
        for code in extract_codes(record) {
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }
    }
    codes
}
