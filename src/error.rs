use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote store error: {message}")]
    Api { message: String },

    /// A validated column held something other than text.
    #[error("Type mismatch in table '{table}' at row {row}, column '{column}': expected text, found {value}")]
    ValidationTypeMismatch {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    /// The row addressed for a write no longer carries the id it had when the
    /// snapshot was taken.
    #[error("Identity mismatch in table '{table}' at row {row}: expected id '{expected}', found '{found}'")]
    RemoteIdentityMismatch {
        table: String,
        row: usize,
        expected: String,
        found: String,
    },

    #[error("Range '{range}' of table '{table}' returned no data")]
    RemoteReadEmpty { table: String, range: String },

    #[error("Gazetteer load failed after {loaded} entries: {message}")]
    GazetteerLoad { loaded: usize, message: String },

    #[error("Identifier '{value}' at position {position} has no numeric suffix")]
    InvalidIdentifier { position: usize, value: String },

    #[error("Column index {0} cannot be expressed in A1 notation")]
    InvalidColumnIndex(usize),

    #[error("Table '{table}' has no column named '{column}'")]
    UnknownColumn { table: String, column: String },
}

pub type Result<T> = std::result::Result<T, CleanerError>;
