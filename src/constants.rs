/// Column names used across the line list.
/// The remote sheets share one header layout; these constants keep the
/// spelling consistent between validation, enrichment and output.

pub const ID: &str = "ID";
pub const AGE: &str = "age";
pub const SEX: &str = "sex";
pub const CITY: &str = "city";
pub const PROVINCE: &str = "province";
pub const COUNTRY: &str = "country";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const GEO_RESOLUTION: &str = "geo_resolution";
pub const AGGREGATE: &str = "aggr";

pub const DATE_ONSET_SYMPTOMS: &str = "date_onset_symptoms";
pub const DATE_ADMISSION_HOSPITAL: &str = "date_admission_hospital";
pub const DATE_CONFIRMATION: &str = "date_confirmation";
pub const DATE_DEATH_OR_DISCHARGE: &str = "date_death_or_discharge";

pub const LOCATION: &str = "location";
pub const ADMIN3: &str = "admin3";
pub const ADMIN2: &str = "admin2";
pub const ADMIN1: &str = "admin1";
pub const COUNTRY_NEW: &str = "country_new";
pub const ADMIN_ID: &str = "admin_id";

/// Prefix of the "lives in the outbreak's origin city" flag columns.
pub const LIVES_IN_PREFIX: &str = "lives_in_";

pub const DATE_COLUMNS: [&str; 4] = [
    DATE_ONSET_SYMPTOMS,
    DATE_ADMISSION_HOSPITAL,
    DATE_CONFIRMATION,
    DATE_DEATH_OR_DISCHARGE,
];

/// Canonical missing-value spelling.
pub const NA: &str = "NA";

/// Counter start when a table has no populated id at all; the first id
/// handed out is `IDENTIFIER_SENTINEL + 1`.
pub const IDENTIFIER_SENTINEL: u64 = 0;

/// Widest header row read from a worksheet (78 columns, `A` through `BZ`).
pub const MAX_COLUMNS: usize = 78;

/// Published column order of the combined dataset. Downstream consumers
/// depend on this order.
pub const OUTPUT_COLUMNS: [&str; 33] = [
    "id",
    AGE,
    SEX,
    CITY,
    PROVINCE,
    COUNTRY,
    LATITUDE,
    LONGITUDE,
    GEO_RESOLUTION,
    DATE_ONSET_SYMPTOMS,
    DATE_ADMISSION_HOSPITAL,
    DATE_CONFIRMATION,
    DATE_DEATH_OR_DISCHARGE,
    "symptoms",
    "lives_in_Wuhan",
    "travel_history_dates",
    "travel_history_location",
    "reported_market_exposure",
    "additional_information",
    "chronic_disease_binary",
    "chronic_disease",
    "source",
    "sequence_available",
    "outcome",
    "notes_for_discussion",
    LOCATION,
    ADMIN3,
    ADMIN2,
    ADMIN1,
    COUNTRY_NEW,
    ADMIN_ID,
    "data_moderator_initials",
    "travel_history_binary",
];

/// Columns of the per-table review report.
pub const REVIEW_REPORT_COLUMNS: [&str; 4] = ["row", "id", "column", "value"];
