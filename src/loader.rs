use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::domain::{DaveConfig, DaveError, Message, Record};

pub const FALLBACK_NOTICE: &str = "Failed to fetch data. Using sample data...";
pub const FAILURE_NOTICE: &str = "Failed to fetch data. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub records: Vec<Record>,
    pub notice: Option<String>,
    pub used_fallback: bool,
}

/// Turn a response body into records. Anything but a JSON array is rejected.
pub fn parse_records(body: Value) -> Result<Vec<Record>, DaveError> {
    let Value::Array(items) = body else {
        return Err(DaveError::UnexpectedPayload(
            "expected a JSON array of records".into(),
        ));
    };
    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if records.len() < total {
        warn!("Skipped {} array items that are not objects", total - records.len());
    }
    Ok(records)
}

/// GET every endpoint and concatenate the records in endpoint order.
pub fn fetch_records(config: &DaveConfig) -> Result<Vec<Record>, DaveError> {
    let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
    let mut records = Vec::new();
    for endpoint in config.endpoints.iter() {
        let start_time = Instant::now();
        debug!("GET {endpoint}");
        let body = agent.get(endpoint).call()?.into_string()?;
        let fetched = parse_records(serde_json::from_str(&body)?)?;
        info!(
            "Fetched {} records from {endpoint} in {}ms",
            fetched.len(),
            start_time.elapsed().as_millis()
        );
        records.extend(fetched);
    }
    Ok(records)
}

/// Fetch, substituting the sample dataset on failure if enabled. Never fails.
pub fn load(config: &DaveConfig) -> LoadOutcome {
    match fetch_records(config) {
        Ok(records) => LoadOutcome {
            records,
            notice: None,
            used_fallback: false,
        },
        Err(e) if config.fallback => {
            warn!("Fetching data failed, using sample data: {e}");
            LoadOutcome {
                records: sample_records(),
                notice: Some(FALLBACK_NOTICE.to_string()),
                used_fallback: true,
            }
        }
        Err(e) => {
            error!("Fetching data failed: {e}");
            LoadOutcome {
                records: Vec::new(),
                notice: Some(FAILURE_NOTICE.to_string()),
                used_fallback: false,
            }
        }
    }
}

/// Run `load` on a worker thread and report back as `Message::Loaded`.
pub fn spawn_load(config: DaveConfig, sender: Sender<Message>) -> JoinHandle<()> {
    thread::spawn(move || {
        let outcome = load(&config);
        if sender.send(Message::Loaded(outcome)).is_err() {
            warn!("Dropping load result, the dashboard is gone");
        }
    })
}

pub fn sample_records() -> Vec<Record> {
    let sample = json!([
        {
            "table_name": "csv_data",
            "cluster name": "lin-netapp01",
            "aggregate name": "n01_a01",
            "type": "SSD",
            "year": "2020",
            "month": "02",
            "used data %": "69.3",
            "available data %": "30.7",
            "daily growth rate %": "0.03",
            "days to full": "1001"
        },
        {
            "table_name": "csv_data",
            "cluster name": "lin-netapp01",
            "aggregate name": "n02_a02",
            "type": "HDD",
            "year": "2021",
            "month": "03",
            "used data %": "72.3",
            "available data %": "27.7",
            "daily growth rate %": "0.1",
            "days to full": "501"
        },
        {
            "table_name": "csv_data",
            "cluster name": "lin-netapp02",
            "aggregate name": "n03_a05",
            "type": "Hybrid",
            "year": "2021",
            "month": "04",
            "used data %": "52.1",
            "available data %": "47.9",
            "daily growth rate %": "0.2",
            "days to full": "220"
        },
        {
            "table_name": "2025_03_19_restorepoints",
            "veeamserver": "server1",
            "vmname": "vm1",
            "restorepoints": 5,
            "col3": "100"
        },
        {
            "table_name": "2025_03_19_backupstatus",
            "vcenter": "vcenter1",
            "vmname": "vm2",
            "shouldbackup": true
        },
        {
            "table_name": "ssl_cert_check",
            "domain": "portal.example.com",
            "issuer": {"commonName": "R3", "organizationName": "Let's Encrypt"},
            "certificate_expiry": "2025-05-02T12:00:00Z",
            "days_to_expiry": 44
        },
        {
            "table_name": "ssl_cert_check",
            "domain": "mail.example.com",
            "issuer": {"organizationName": "DigiCert Inc"},
            "certificate_expiry": "2025-03-30T08:30:00Z",
            "days_to_expiry": 11
        }
    ]);
    // The literal above is an array of objects
    parse_records(sample).unwrap_or_default()
}
