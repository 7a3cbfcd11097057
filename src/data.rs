use crate::types::TransactionRecord;
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "PriceCategory",
    "Prefecture",
    "Municipality",
    "Period",
    "DistrictName",
    "Latitude",
    "Longitude",
    "Age",
    "UnitPrice",
];

/// The loaded transaction table. Built once per session and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    records: Vec<TransactionRecord>,
}

impl TransactionTable {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct price categories, descending.
    pub fn price_categories(&self) -> Vec<String> {
        descending(self.records.iter().map(|r| r.price_category.as_str()))
    }

    /// Distinct periods, descending so the latest period comes first.
    pub fn periods(&self) -> Vec<String> {
        descending(self.records.iter().map(|r| r.period.as_str()))
    }

    pub fn prefectures(&self) -> Vec<String> {
        ascending(self.records.iter().map(|r| r.prefecture.as_str()))
    }

    pub fn municipalities(&self, prefecture: &str) -> Vec<String> {
        ascending(
            self.records
                .iter()
                .filter(|r| r.prefecture == prefecture)
                .map(|r| r.municipality.as_str()),
        )
    }
}

fn ascending<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn descending<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut list = ascending(values);
    list.reverse();
    list
}

pub fn load_transactions(path: &Path) -> Result<TransactionTable> {
    info!("Loading transactions from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let table = read_transactions(file)
        .with_context(|| format!("Failed to load transactions from {:?}", path))?;
    if table.is_empty() {
        warn!("{:?} contains no transactions", path);
    } else {
        info!("Loaded {} transactions", table.len());
    }
    Ok(table)
}

pub fn read_transactions<R: Read>(reader: R) -> Result<TransactionTable> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(anyhow!("Required column '{}' not found in CSV", column));
        }
    }

    let mut records = Vec::new();
    for result in rdr.deserialize::<TransactionRecord>() {
        // Quoted fields may span lines, so take the line from the reader.
        let record = result.map_err(|e| match e.position() {
            Some(pos) => anyhow!("Malformed transaction on line {}: {}", pos.line(), e),
            None => anyhow!("Malformed transaction: {}", e),
        })?;
        records.push(record);
    }

    Ok(TransactionTable::new(records))
}
