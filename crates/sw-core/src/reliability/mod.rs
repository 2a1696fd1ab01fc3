//! Rule-category reliability coefficients and their persisted overrides.

mod catalog;
mod overrides;

pub use catalog::{
    normalize as normalize_category, OverrideLoadSummary, ReliabilityBand, ReliabilityCatalog,
    ReliabilityEntry, DEFAULT_COEFFICIENT, MAX_COEFFICIENT, MIN_COEFFICIENT,
};
pub use overrides::{
    OverrideError, OverrideMetadata, ReliabilityOverrideFile, OVERRIDE_FORMAT_VERSION,
};
