// Pure processing stages: grammar checks, repair classification, spelling
// normalization, identifier allocation and geocoding.

pub mod classify;
pub mod geocode;
pub mod identifiers;
pub mod normalize;
pub mod validate;
