//! Constants used throughout the rxmatch core crate.

/// Catalogue location searched when no explicit path is configured.
pub const DEFAULT_CATALOGUE_PATH: &str = "data/catalogue.yaml";

/// Maximum number of concurrent repository sessions when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Page requested when the caller does not name one.
pub const DEFAULT_PAGE: usize = 1;

/// Page size requested when the caller does not name one.
pub const DEFAULT_ROW: usize = 10;

/// `contrast_type` of a drug-drug interaction row.
pub const INTERACTION_CONTRAST_TYPE: i32 = 0;

/// `allergy_type` when the overlap comes from current medications only.
pub const ALLERGY_TYPE_CURRENT: u8 = 0;

/// `allergy_type` when the overlap comes from historical medications only.
pub const ALLERGY_TYPE_HISTORY: u8 = 1;

/// `allergy_type` when the overlap comes from both current and historical medications.
pub const ALLERGY_TYPE_BOTH: u8 = 2;

/// Envelope code of a successful matching response.
pub const SUCCESS_CODE: u16 = 200;

/// Envelope message of a successful matching response.
pub const SUCCESS_MESSAGE: &str = "get success";
