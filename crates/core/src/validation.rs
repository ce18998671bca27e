//! Input validation utilities.
//!
//! Payloads and pagination are checked here before any matching work starts, so the engines
//! never see a request that violates the minimum-size constraints.

use crate::wire::{AllergyPayload, DrugPayload};
use crate::{MatchError, MatchResult};

/// Validates an interaction request.
///
/// # Errors
///
/// Returns `MatchError::InvalidInput` if `drug_currents` is empty.
pub fn validate_drug_payload(payload: &DrugPayload) -> MatchResult<()> {
    if payload.drug_currents.is_empty() {
        return Err(MatchError::InvalidInput(
            "drug_currents must contain at least 1 item".into(),
        ));
    }
    Ok(())
}

/// Validates an allergy request.
///
/// # Errors
///
/// Returns `MatchError::InvalidInput` if `drug_currents` or `drug_allergies` is empty.
pub fn validate_allergy_payload(payload: &AllergyPayload) -> MatchResult<()> {
    if payload.drug_currents.is_empty() {
        return Err(MatchError::InvalidInput(
            "drug_currents must contain at least 1 item".into(),
        ));
    }
    if payload.drug_allergies.is_empty() {
        return Err(MatchError::InvalidInput(
            "drug_allergies must contain at least 1 item".into(),
        ));
    }
    Ok(())
}

/// Validates a page request. Both `page` and `row` are 1-based counts.
///
/// # Errors
///
/// Returns `MatchError::InvalidInput` if either value is zero.
pub fn validate_pagination(page: usize, row: usize) -> MatchResult<()> {
    if page < 1 {
        return Err(MatchError::InvalidInput("page must be >= 1".into()));
    }
    if row < 1 {
        return Err(MatchError::InvalidInput("row must be >= 1".into()));
    }
    Ok(())
}
