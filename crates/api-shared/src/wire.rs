//! Wire models for the matching endpoints.
//!
//! These are the exact JSON shapes accepted and produced by the REST API and the CLI. Field names
//! follow the drug hierarchy used by the knowledge catalogue, most specific first:
//!
//! | prefix | level                         |
//! |--------|-------------------------------|
//! | `tpu`  | package, brand                |
//! | `tp`   | product, brand                |
//! | `gpu`  | package, generic              |
//! | `gp`   | product, generic              |
//! | `vtm`  | virtual therapeutic moiety    |
//! | `subs` | active substance              |
//!
//! The wire types carry no behaviour; hierarchy handling lives in `rxmatch-core`.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Deserialises `null` as the type's default value.
///
/// Existing clients send `null` for optional lists and flags, so every defaulted field accepts both
/// a missing key and an explicit `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// One medication line on a current, history or allergy list.
///
/// Every code and name slot is optional. `None` and `Some("")` both mean "no code known"; a slot
/// holding a non-empty string is a code supplied by the caller or backfilled by enrichment.
/// A record with no code in any slot and no `name` cannot be resolved and never contributes to
/// a match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DrugRecord {
    /// Package-level brand code.
    #[serde(default)]
    pub tpu_code: Option<String>,
    /// Product-level brand code.
    #[serde(default)]
    pub tp_code: Option<String>,
    /// Package-level generic code.
    #[serde(default)]
    pub gpu_code: Option<String>,
    /// Product-level generic code.
    #[serde(default)]
    pub gp_code: Option<String>,
    /// Virtual therapeutic moiety code.
    #[serde(default)]
    pub vtm_code: Option<String>,
    /// Active substance code.
    #[serde(default)]
    pub subs_code: Option<String>,

    #[serde(default)]
    pub tpu_name: Option<String>,
    #[serde(default)]
    pub tp_name: Option<String>,
    #[serde(default)]
    pub gpu_name: Option<String>,
    #[serde(default)]
    pub gp_name: Option<String>,
    #[serde(default)]
    pub vtm_name: Option<String>,
    #[serde(default)]
    pub subs_name: Option<String>,

    #[serde(default)]
    pub quantity: Option<i64>,

    /// Free-text drug name, used when no code is supplied.
    #[serde(default)]
    pub name: Option<String>,

    /// True when the record comes from outside the trusted formulary.
    #[serde(default, deserialize_with = "null_as_default")]
    pub external: bool,

    /// Every substance a free-text name resolved to. `subs_code` holds the first of them.
    ///
    /// Empty unless name resolution ran for this record; never part of the wire format.
    #[serde(skip)]
    pub substance_candidates: Vec<String>,
}

/// Request body for `POST /api/v1/drugs`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DrugPayload {
    /// Current medications. At least one is required.
    pub drug_currents: Vec<DrugRecord>,
    /// Historical medications.
    #[serde(default, deserialize_with = "null_as_default")]
    pub drug_histories: Vec<DrugRecord>,
}

/// Request body for `POST /api/v1/allergy`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct AllergyPayload {
    /// Current medications. At least one is required.
    pub drug_currents: Vec<DrugRecord>,
    /// Historical medications.
    #[serde(default, deserialize_with = "null_as_default")]
    pub drug_histories: Vec<DrugRecord>,
    /// Recorded drug allergies. At least one is required.
    pub drug_allergies: Vec<DrugRecord>,
}

// ============================================================================
// RESULT ROWS
// ============================================================================

/// A substance reference inside a result row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubstanceRef {
    pub code: String,
    pub name: String,
}

/// One input item paired with one contrasting item that share a documented interaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContrastItem {
    /// Opaque identifier generated per row.
    pub ref_id: String,

    pub input_tpu_code: String,
    pub input_tpu_name: String,
    pub input_tp_code: String,
    pub input_tp_name: String,
    pub input_gpu_code: String,
    pub input_gpu_name: String,
    pub input_gp_code: String,
    pub input_gp_name: String,
    pub input_vtm_code: String,
    pub input_vtm_name: String,
    pub input_subs_code: String,
    pub input_subs_name: String,
    pub input_description: String,

    pub contrast_tpu_code: String,
    pub contrast_tpu_name: String,
    pub contrast_tp_code: String,
    pub contrast_tp_name: String,
    pub contrast_gpu_code: String,
    pub contrast_gpu_name: String,
    pub contrast_gp_code: String,
    pub contrast_gp_name: String,
    pub contrast_vtm_code: String,
    pub contrast_vtm_name: String,
    pub contrast_subs_code: String,
    pub contrast_subs_name: String,
    pub contrast_description: String,

    /// Contrast category. Only drug-drug interactions (`0`) exist today.
    pub contrast_type: i32,

    pub interaction_detail_en: String,
    pub interaction_detail_th: String,
    pub onset: String,
    pub severity: String,
    pub documentation: String,
    pub significance: String,
    pub management: String,
    pub discussion: String,
    pub reference: String,

    pub input_substances: Vec<SubstanceRef>,
    pub contrast_substances: Vec<SubstanceRef>,
}

/// An allergy-list entry whose substances overlap the patient's active substances.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AllergyItem {
    pub input_tpu_code: String,
    pub input_tpu_name: String,
    pub input_tp_code: String,
    pub input_tp_name: String,
    pub input_gpu_code: String,
    pub input_gpu_name: String,
    pub input_gp_code: String,
    pub input_gp_name: String,
    pub input_vtm_code: String,
    pub input_vtm_name: String,
    pub input_subs_code: String,
    pub input_subs_name: String,
    pub input_description: String,

    pub is_allergy: bool,
    /// 0 = matched via current medication only, 1 = history only, 2 = both.
    #[schema(minimum = 0, maximum = 2)]
    pub allergy_type: u8,
    pub allergy_substances: Vec<SubstanceRef>,
}

// ============================================================================
// PAGINATION & ENVELOPES
// ============================================================================

/// Pagination block of a page response.
///
/// `row` is the length of the returned slice, not the requested page size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: usize,
    pub row: usize,
    pub total: usize,
}

/// One page of interaction rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContrastPage {
    pub pagination: Pagination,
    pub data: Vec<ContrastItem>,
}

/// One page of allergy rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AllergyPage {
    pub pagination: Pagination,
    pub data: Vec<AllergyItem>,
}

/// Response body for `POST /api/v1/drugs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DrugsResponse {
    pub status: bool,
    pub code: u16,
    pub message: String,
    pub data: ContrastPage,
}

/// Response body for `POST /api/v1/allergy`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AllergyResponse {
    pub status: bool,
    pub code: u16,
    pub message: String,
    pub data: AllergyPage,
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}
