use crate::types::MobilityRecord;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Every mobility row in the CSV, in file order.
#[derive(Debug, Clone, Default)]
pub struct MobilityTable {
    records: Vec<MobilityRecord>,
}

impl MobilityTable {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
        Self::from_reader(file).with_context(|| format!("Failed to load mobility data from {:?}", path))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut records = Vec::new();
        for (row, result) in rdr.deserialize::<MobilityRecord>().enumerate() {
            // header is line 1
            let record = result.with_context(|| format!("Invalid mobility row at line {}", row + 2))?;
            records.push(record);
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn for_province(&self, province: &str) -> Vec<&MobilityRecord> {
        self.records.iter().filter(|r| r.province == province).collect()
    }
}
