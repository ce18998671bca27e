//! Code extraction and hierarchy resolution for individual drug records.
//!
//! A drug can be identified at six levels, ordered most specific to least specific:
//!
//! ```text
//! 0 tpu   package, brand
//! 1 tp    product, brand
//! 2 gpu   package, generic
//! 3 gp    product, generic
//! 4 vtm   virtual therapeutic moiety
//! 5 subs  active substance
//! ```
//!
//! A record's *most specific level* is the lowest index whose code slot is populated. Result rows
//! only ever surface that level and the coarser ones: a record known at product-generic level must
//! not show package-level detail.

use crate::wire::DrugRecord;
use std::collections::BTreeMap;

/// Index returned by [`most_specific_level`] when a record carries no code at all.
pub const NO_LEVEL: usize = 6;

/// One level of the drug hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HierarchyLevel {
    PackageBrand,
    ProductBrand,
    PackageGeneric,
    ProductGeneric,
    Moiety,
    Substance,
}

impl HierarchyLevel {
    /// All levels, most specific first.
    pub const ALL: [HierarchyLevel; 6] = [
        HierarchyLevel::PackageBrand,
        HierarchyLevel::ProductBrand,
        HierarchyLevel::PackageGeneric,
        HierarchyLevel::ProductGeneric,
        HierarchyLevel::Moiety,
        HierarchyLevel::Substance,
    ];

    /// Position of the level, 0 being the most specific.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Field-name key of the level (`tpu`, `tp`, `gpu`, `gp`, `vtm`, `subs`).
    pub fn key(self) -> &'static str {
        match self {
            HierarchyLevel::PackageBrand => "tpu",
            HierarchyLevel::ProductBrand => "tp",
            HierarchyLevel::PackageGeneric => "gpu",
            HierarchyLevel::ProductGeneric => "gp",
            HierarchyLevel::Moiety => "vtm",
            HierarchyLevel::Substance => "subs",
        }
    }

    /// The record's code at this level, if non-empty.
    pub fn code(self, record: &DrugRecord) -> Option<&str> {
        non_empty(self.code_slot(record))
    }

    /// The record's name at this level, if non-empty.
    pub fn name(self, record: &DrugRecord) -> Option<&str> {
        non_empty(self.name_slot(record))
    }

    fn code_slot(self, record: &DrugRecord) -> &Option<String> {
        match self {
            HierarchyLevel::PackageBrand => &record.tpu_code,
            HierarchyLevel::ProductBrand => &record.tp_code,
            HierarchyLevel::PackageGeneric => &record.gpu_code,
            HierarchyLevel::ProductGeneric => &record.gp_code,
            HierarchyLevel::Moiety => &record.vtm_code,
            HierarchyLevel::Substance => &record.subs_code,
        }
    }

    fn name_slot(self, record: &DrugRecord) -> &Option<String> {
        match self {
            HierarchyLevel::PackageBrand => &record.tpu_name,
            HierarchyLevel::ProductBrand => &record.tp_name,
            HierarchyLevel::PackageGeneric => &record.gpu_name,
            HierarchyLevel::ProductGeneric => &record.gp_name,
            HierarchyLevel::Moiety => &record.vtm_name,
            HierarchyLevel::Substance => &record.subs_name,
        }
    }

    pub(crate) fn code_slot_mut(self, record: &mut DrugRecord) -> &mut Option<String> {
        match self {
            HierarchyLevel::PackageBrand => &mut record.tpu_code,
            HierarchyLevel::ProductBrand => &mut record.tp_code,
            HierarchyLevel::PackageGeneric => &mut record.gpu_code,
            HierarchyLevel::ProductGeneric => &mut record.gp_code,
            HierarchyLevel::Moiety => &mut record.vtm_code,
            HierarchyLevel::Substance => &mut record.subs_code,
        }
    }

    pub(crate) fn name_slot_mut(self, record: &mut DrugRecord) -> &mut Option<String> {
        match self {
            HierarchyLevel::PackageBrand => &mut record.tpu_name,
            HierarchyLevel::ProductBrand => &mut record.tp_name,
            HierarchyLevel::PackageGeneric => &mut record.gpu_name,
            HierarchyLevel::ProductGeneric => &mut record.gp_name,
            HierarchyLevel::Moiety => &mut record.vtm_name,
            HierarchyLevel::Substance => &mut record.subs_name,
        }
    }
}

pub(crate) fn non_empty(slot: &Option<String>) -> Option<&str> {
    slot.as_deref().filter(|s| !s.is_empty())
}

/// Extracts every non-empty code of a record, in level order.
///
/// When free-text resolution produced several candidate substances, all of them are yielded in
/// the substance position, so the result is always a flat list of single codes.
pub fn extract_codes(record: &DrugRecord) -> Vec<String> {
    let mut codes = Vec::new();
    for level in HierarchyLevel::ALL {
        if level == HierarchyLevel::Substance && !record.substance_candidates.is_empty() {
            codes.extend(
                record
                    .substance_candidates
                    .iter()
                    .filter(|c| !c.is_empty())
                    .cloned(),
            );
        } else if let Some(code) = level.code(record) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// Returns the index of the record's most specific populated level, or [`NO_LEVEL`].
pub fn most_specific_level(record: &DrugRecord) -> usize {
    HierarchyLevel::ALL
        .iter()
        .find(|level| level.code(record).is_some())
        .map(|level| level.index())
        .unwrap_or(NO_LEVEL)
}

/// Hierarchy fields of a record as exposed in a result row.
///
/// Levels finer than the record's most specific level are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectedFields {
    prefix: &'static str,
    codes: [String; 6],
    names: [String; 6],
    description: String,
}

impl ProjectedFields {
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn code(&self, level: HierarchyLevel) -> &str {
        &self.codes[level.index()]
    }

    pub fn name(&self, level: HierarchyLevel) -> &str {
        &self.names[level.index()]
    }

    /// Reserved; always empty.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The fields keyed as `{prefix}_{level}_code`, `{prefix}_{level}_name` and
    /// `{prefix}_description`.
    pub fn to_field_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for level in HierarchyLevel::ALL {
            out.insert(
                format!("{}_{}_code", self.prefix, level.key()),
                self.code(level).to_string(),
            );
            out.insert(
                format!("{}_{}_name", self.prefix, level.key()),
                self.name(level).to_string(),
            );
        }
        out.insert(
            format!("{}_description", self.prefix),
            self.description.clone(),
        );
        out
    }
}

/// Projects a record's hierarchy fields at or above its most specific level under `prefix`.
pub fn project_fields(prefix: &'static str, record: &DrugRecord) -> ProjectedFields {
    let top = most_specific_level(record);
    let mut fields = ProjectedFields {
        prefix,
        ..Default::default()
    };
    for level in HierarchyLevel::ALL {
        if level.index() >= top {
            fields.codes[level.index()] = level.code(record).unwrap_or_default().to_string();
            fields.names[level.index()] = level.name(record).unwrap_or_default().to_string();
        }
    }
    fields
}
