//! Field validators: pure checks of a single cell against the grammar of its
//! column. Nothing here consults reference data; a place name only has to
//! look like a place name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::constants::{
    AGE, CITY, COUNTRY, DATE_COLUMNS, GEO_RESOLUTION, LATITUDE, LIVES_IN_PREFIX, LONGITUDE, NA,
    PROVINCE, SEX,
};

static AGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?(-\d+(\.\d+)?)?$").expect("age pattern"));

static SEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(male|female)$").expect("sex pattern"));

static PLACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{M}'.,()/\- ]+$").expect("place pattern"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    let day = r"\d{2}\.\d{2}\.\d{4}";
    let month = r"(?i:january|february|march|april|may|june|july|august|september|october|november|december)";
    let approx = format!(r"(?i:early|mid|late) {}( \d{{4}})?", month);
    let token = format!("(?:{}|{})", day, approx);
    Regex::new(&format!(r"^{token}(\s*-\s*{token})?$", token = token)).expect("date pattern")
});

static COORDINATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("coordinate pattern"));

static GEO_RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(point|admin3|admin2|admin1|country)$").expect("geo_resolution pattern"));

static YES_NO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(yes|no)$").expect("yes/no pattern"));

/// The grammar a column is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnClass {
    Age,
    Sex,
    PlaceName,
    Date,
    Coordinate,
    GeoResolution,
    LivesIn,
}

impl ColumnClass {
    /// Grammar for a column name, or `None` for free-form columns.
    pub fn for_column(column: &str) -> Option<Self> {
        match column {
            AGE => Some(Self::Age),
            SEX => Some(Self::Sex),
            CITY | PROVINCE | COUNTRY => Some(Self::PlaceName),
            LATITUDE | LONGITUDE => Some(Self::Coordinate),
            GEO_RESOLUTION => Some(Self::GeoResolution),
            c if DATE_COLUMNS.contains(&c) => Some(Self::Date),
            c if c.starts_with(LIVES_IN_PREFIX) => Some(Self::LivesIn),
            _ => None,
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Age => &AGE_RE,
            Self::Sex => &SEX_RE,
            Self::PlaceName => &PLACE_RE,
            Self::Date => &DATE_RE,
            Self::Coordinate => &COORDINATE_RE,
            Self::GeoResolution => &GEO_RESOLUTION_RE,
            Self::LivesIn => &YES_NO_RE,
        }
    }

    /// Whether `value` is in canonical form for this class. Blank and `NA`
    /// mark a missing value and are always accepted.
    pub fn accepts(self, value: &str) -> bool {
        value.is_empty() || value == NA || self.pattern().is_match(value)
    }
}

/// Validates `value` as a cell of `column`. Columns without a grammar accept
/// anything.
pub fn is_valid(value: &str, column: &str) -> bool {
    ColumnClass::for_column(column).map_or(true, |class| class.accepts(value))
}
