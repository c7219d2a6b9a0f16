//! Function Catalog
//!
//! Read-only catalog of API function records. A catalog is assembled once
//! with [`CatalogBuilder`] and never changes afterwards; consumers receive
//! it explicitly.

pub mod builtin;
pub mod types;

pub use types::{ArgSpec, FunctionRecord, ResultSpec};

use crate::Result;
use anyhow::{bail, Context};
use std::collections::BTreeMap;

/// Collects records before the catalog is frozen
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    records: BTreeMap<String, FunctionRecord>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; names must be unique and non-empty.
    pub fn register(&mut self, record: FunctionRecord) -> Result<&mut Self> {
        if record.name.is_empty() {
            bail!("Function record has an empty name");
        }
        if record.topic.is_empty() {
            bail!("Function {} has an empty topic", record.name);
        }
        if self.records.contains_key(&record.name) {
            bail!("Function {} is already registered", record.name);
        }
        tracing::debug!(name = %record.name, topic = %record.topic, "Registered function record");
        self.records.insert(record.name.clone(), record);
        Ok(self)
    }

    pub fn build(self) -> FunctionCatalog {
        FunctionCatalog {
            records: self.records,
        }
    }
}

/// Immutable set of function records keyed by name
#[derive(Debug, Clone)]
pub struct FunctionCatalog {
    records: BTreeMap<String, FunctionRecord>,
}

impl FunctionCatalog {
    /// Catalog of the functions this crate implements
    pub fn builtin() -> Result<Self> {
        let mut builder = CatalogBuilder::new();
        for record in builtin::all() {
            builder.register(record)?;
        }
        Ok(builder.build())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionRecord> {
        self.records.get(name)
    }

    /// Function names in alphabetical order
    pub fn names(&self) -> Vec<&str> {
        self.records.keys().map(String::as_str).collect()
    }

    /// Records belonging to `topic`, ordered by name
    pub fn topic(&self, topic: &str) -> Vec<&FunctionRecord> {
        self.records
            .values()
            .filter(|record| record.topic == topic)
            .collect()
    }

    /// Function names grouped by topic
    pub fn topics(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut topics: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for record in self.records.values() {
            topics
                .entry(record.topic.as_str())
                .or_default()
                .push(record.name.as_str());
        }
        topics
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.records.values()
    }

    /// Pretty JSON for one record
    pub fn to_json(&self, name: &str) -> Result<String> {
        let record = self
            .get(name)
            .with_context(|| format!("Unknown function: {}", name))?;
        Ok(serde_json::to_string_pretty(record)?)
    }

    /// Pretty JSON array of every record
    pub fn all_to_json(&self) -> Result<String> {
        let records: Vec<_> = self.iter().collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }
}
