use std::fmt;
use std::io::Error;
use std::path::PathBuf;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use serde_json::{Map, Value};

use crate::loader::LoadOutcome;

/// A single row as delivered by the report API. Field order is preserved.
pub type Record = Map<String, Value>;

pub const DEFAULT_ENDPOINT: &str = "https://o2merk3yse.execute-api.us-east-1.amazonaws.com/dev/data";
pub const DEFAULT_DISCRIMINATOR: &str = "table_name";

pub const HELP_TEXT: &str = "\
Tab / Shift-Tab     next / previous table
Up / Down           move selection (wraps into the next page)
Left / Right        move column
n / p               next / previous page
g / G               first / last page
z                   cycle page size (5, 10, 25)
/                   search in all visible fields
F                   filter current column by text
f                   filter by current cell value
Esc                 drop last filter, clear search, close popups
s / S               sort current column ascending / descending
Enter               show record details
h                   value distribution of the current column
l                   line chart of the current column over the first rows
e / E               export filtered rows / whole table to CSV
y                   copy current cell
r                   refresh data
t                   toggle dark mode
?                   this help
q                   quit";

#[derive(Debug)]
pub enum DaveError {
    IoError(Error),
    HttpError(Box<ureq::Error>),
    JsonError(serde_json::Error),
    PolarsError(PolarsError),
    UnexpectedPayload(String),
    ExportFailed(String),
    InvalidConfig(String),
}

impl fmt::Display for DaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaveError::IoError(e) => write!(f, "io error: {e}"),
            DaveError::HttpError(e) => write!(f, "http error: {e}"),
            DaveError::JsonError(e) => write!(f, "invalid json: {e}"),
            DaveError::PolarsError(e) => write!(f, "csv error: {e}"),
            DaveError::UnexpectedPayload(m) => write!(f, "unexpected payload: {m}"),
            DaveError::ExportFailed(m) => write!(f, "export failed: {m}"),
            DaveError::InvalidConfig(m) => write!(f, "invalid configuration: {m}"),
        }
    }
}

impl std::error::Error for DaveError {}

impl From<Error> for DaveError {
    fn from(err: Error) -> Self {
        DaveError::IoError(err)
    }
}

impl From<ureq::Error> for DaveError {
    fn from(err: ureq::Error) -> Self {
        DaveError::HttpError(Box::new(err))
    }
}

impl From<serde_json::Error> for DaveError {
    fn from(err: serde_json::Error) -> Self {
        DaveError::JsonError(err)
    }
}

impl From<PolarsError> for DaveError {
    fn from(err: PolarsError) -> Self {
        DaveError::PolarsError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    SearchTable,
    FilterByColumn,
}

#[derive(Debug, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    CyclePageSize,
    NextTable,
    PreviousTable,
    Search,
    Filter,
    FilterByCell,
    SortAscending,
    SortDescending,
    Enter,
    Exit,
    Distribution,
    Trend,
    Export,
    ExportAll,
    Refresh,
    ToggleTheme,
    CopyCell,
    Help,
    Resize(usize, usize),
    RawKey(KeyEvent),
    Loaded(LoadOutcome),
}

#[derive(Debug, Clone, Setters)]
pub struct DaveConfig {
    pub endpoints: Vec<String>,
    pub discriminator: String,
    pub hidden_fields: Vec<String>,
    pub page_size: usize,
    pub fallback: bool,
    pub export_dir: PathBuf,
    pub timeout: Duration,
    pub dark_mode: bool,
    pub event_poll_time: u64,
    pub max_column_width: usize,
}

impl Default for DaveConfig {
    fn default() -> Self {
        DaveConfig {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            hidden_fields: vec![DEFAULT_DISCRIMINATOR.to_string()],
            page_size: 10,
            fallback: false,
            export_dir: PathBuf::from("."),
            timeout: Duration::from_secs(10),
            dark_mode: false,
            event_poll_time: 100,
            max_column_width: 32,
        }
    }
}

impl DaveConfig {
    pub fn validate(mut self) -> Result<Self, DaveError> {
        if self.endpoints.is_empty() {
            return Err(DaveError::InvalidConfig("at least one endpoint is required".into()));
        }
        if !crate::table::PAGE_SIZES.contains(&self.page_size) {
            return Err(DaveError::InvalidConfig(format!(
                "page size must be one of {:?}, got {}",
                crate::table::PAGE_SIZES,
                self.page_size
            )));
        }
        if self.max_column_width < 4 {
            return Err(DaveError::InvalidConfig("max column width must be at least 4".into()));
        }
        // The discriminator is never shown as a column.
        if !self
            .hidden_fields
            .iter()
            .any(|h| h.eq_ignore_ascii_case(&self.discriminator))
        {
            self.hidden_fields.push(self.discriminator.clone());
        }
        Ok(self)
    }
}
