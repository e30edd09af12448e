//! Exact-match geocoding against a pre-built gazetteer.
//!
//! Keys are `"{city};{province};{country}"` lower-cased, the same key the
//! spreadsheet lookup used. There is no partial or fuzzy matching.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{ADMIN1, ADMIN2, ADMIN3, ADMIN_ID, CITY, COUNTRY, COUNTRY_NEW, GEO_RESOLUTION, LATITUDE, LOCATION, LONGITUDE, PROVINCE};
use crate::error::{CleanerError, Result};
use crate::types::CaseRecord;

/// Enrichment attached to a matched row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geocode {
    pub latitude: f64,
    pub longitude: f64,
    /// Coordinates as written in the gazetteer; published verbatim.
    pub latitude_text: String,
    pub longitude_text: String,
    pub geo_resolution: String,
    pub location: String,
    pub admin3: String,
    pub admin2: String,
    pub admin1: String,
    pub country_new: String,
    pub admin_id: i64,
}

/// A lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GeocodeMiss {
    pub city: String,
    pub province: String,
    pub country: String,
}

/// 0-based column positions of a gazetteer export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GazetteerLayout {
    pub key: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub geo_resolution: usize,
    pub location: usize,
    pub admin3: usize,
    pub admin2: usize,
    pub admin1: usize,
    pub country_new: usize,
    pub admin_id: usize,
}

impl GazetteerLayout {
    /// The geo_admin worksheet exported as-is.
    pub const SHEET_EXPORT: Self = Self {
        key: 8,
        latitude: 10,
        longitude: 11,
        geo_resolution: 12,
        location: 13,
        admin3: 14,
        admin2: 15,
        admin1: 16,
        country_new: 17,
        admin_id: 18,
    };

    /// The merged ten-column file.
    pub const COMPACT: Self = Self {
        key: 0,
        latitude: 1,
        longitude: 2,
        geo_resolution: 3,
        location: 4,
        admin3: 5,
        admin2: 6,
        admin1: 7,
        country_new: 8,
        admin_id: 9,
    };

    fn width(&self) -> usize {
        [
            self.key,
            self.latitude,
            self.longitude,
            self.geo_resolution,
            self.location,
            self.admin3,
            self.admin2,
            self.admin1,
            self.country_new,
            self.admin_id,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GazetteerLoadStats {
    pub loaded: usize,
    /// Rows dropped for a missing key or unparseable coordinates.
    pub skipped: usize,
    /// Keys seen more than once; the last row wins.
    pub duplicates: usize,
}

pub fn composite_key(city: &str, province: &str, country: &str) -> String {
    format!("{};{};{}", city, province, country).to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: HashMap<String, Geocode>,
}

impl Gazetteer {
    pub fn load(path: &Path, layout: GazetteerLayout) -> Result<(Self, GazetteerLoadStats)> {
        let file = File::open(path).map_err(|e| CleanerError::GazetteerLoad {
            loaded: 0,
            message: format!("cannot open {}: {}", path.display(), e),
        })?;
        let (gazetteer, stats) = Self::from_reader(file, layout)?;
        info!(
            path = %path.display(),
            loaded = stats.loaded,
            skipped = stats.skipped,
            "loaded gazetteer"
        );
        Ok((gazetteer, stats))
    }

    /// Reads tab-separated rows without a header. A row whose admin id does
    /// not parse keeps the row with `admin_id = 0`.
    pub fn from_reader<R: Read>(reader: R, layout: GazetteerLayout) -> Result<(Self, GazetteerLoadStats)> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut entries = HashMap::new();
        let mut stats = GazetteerLoadStats::default();

        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| CleanerError::GazetteerLoad {
                loaded: entries.len(),
                message: format!("line {}: {}", line + 1, e),
            })?;
            if record.len() < layout.width() {
                stats.skipped += 1;
                continue;
            }
            let field = |i: usize| record.get(i).unwrap_or_default();

            let key = field(layout.key).to_lowercase();
            let latitude_text = field(layout.latitude).trim();
            let longitude_text = field(layout.longitude).trim();
            let latitude = latitude_text.parse::<f64>();
            let longitude = longitude_text.parse::<f64>();
            let (Ok(latitude), Ok(longitude)) = (latitude, longitude) else {
                debug!(line = line + 1, "gazetteer row without usable coordinates");
                stats.skipped += 1;
                continue;
            };
            if key.trim().is_empty() {
                stats.skipped += 1;
                continue;
            }

            let geocode = Geocode {
                latitude,
                longitude,
                latitude_text: latitude_text.to_string(),
                longitude_text: longitude_text.to_string(),
                geo_resolution: field(layout.geo_resolution).to_string(),
                location: field(layout.location).to_string(),
                admin3: field(layout.admin3).to_string(),
                admin2: field(layout.admin2).to_string(),
                admin1: field(layout.admin1).to_string(),
                country_new: field(layout.country_new).to_string(),
                admin_id: field(layout.admin_id).trim().parse().unwrap_or(0),
            };
            if entries.insert(key, geocode).is_some() {
                stats.duplicates += 1;
            }
        }

        stats.loaded = entries.len();
        if stats.skipped > 0 {
            warn!(
                loaded = stats.loaded,
                skipped = stats.skipped,
                "gazetteer loaded partially"
            );
        }
        Ok((Self { entries }, stats))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, city: &str, province: &str, country: &str) -> Option<&Geocode> {
        self.entries.get(&composite_key(city, province, country))
    }
}

/// Applies a gazetteer to rows and remembers what it could not find.
pub struct GeocodeMatcher<'a> {
    gazetteer: &'a Gazetteer,
    misses: HashMap<GeocodeMiss, usize>,
    hits: usize,
}

impl<'a> GeocodeMatcher<'a> {
    pub fn new(gazetteer: &'a Gazetteer) -> Self {
        Self {
            gazetteer,
            misses: HashMap::new(),
            hits: 0,
        }
    }

    pub fn geocode(&mut self, city: &str, province: &str, country: &str) -> Option<&'a Geocode> {
        match self.gazetteer.lookup(city, province, country) {
            Some(geocode) => {
                self.hits += 1;
                Some(geocode)
            }
            None => {
                let miss = GeocodeMiss {
                    city: city.to_string(),
                    province: province.to_string(),
                    country: country.to_string(),
                };
                *self.misses.entry(miss).or_insert(0) += 1;
                None
            }
        }
    }

    /// Overwrites the coordinate and admin fields of a matched row. Rows
    /// without a match keep what they had.
    pub fn enrich(&mut self, record: &mut CaseRecord) -> bool {
        let city = record.field(CITY).to_string();
        let province = record.field(PROVINCE).to_string();
        let country = record.field(COUNTRY).to_string();
        let Some(geocode) = self.geocode(&city, &province, &country) else {
            return false;
        };
        record.set(LATITUDE, geocode.latitude_text.as_str());
        record.set(LONGITUDE, geocode.longitude_text.as_str());
        record.set(GEO_RESOLUTION, geocode.geo_resolution.as_str());
        record.set(LOCATION, geocode.location.as_str());
        record.set(ADMIN3, geocode.admin3.as_str());
        record.set(ADMIN2, geocode.admin2.as_str());
        record.set(ADMIN1, geocode.admin1.as_str());
        record.set(COUNTRY_NEW, geocode.country_new.as_str());
        record.set(ADMIN_ID, geocode.admin_id.to_string());
        true
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Misses with their counts, most frequent first.
    pub fn misses(&self) -> Vec<(GeocodeMiss, usize)> {
        let mut misses: Vec<(GeocodeMiss, usize)> =
            self.misses.iter().map(|(m, n)| (m.clone(), *n)).collect();
        misses.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        misses
    }

    pub fn record_metrics(&self) {
        counter!("cleaner_geocode_lookups_total", "result" => "hit").increment(self.hits as u64);
        counter!("cleaner_geocode_lookups_total", "result" => "miss")
            .increment(self.misses.values().sum::<usize>() as u64);
    }
}

/// Config-file spelling of a layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazetteerFormat {
    #[default]
    SheetExport,
    Compact,
}

impl GazetteerFormat {
    pub fn layout(self) -> GazetteerLayout {
        match self {
            Self::SheetExport => GazetteerLayout::SHEET_EXPORT,
            Self::Compact => GazetteerLayout::COMPACT,
        }
    }
}
