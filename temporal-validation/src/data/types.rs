//! Core data types for temporal validation.
//!
//! A [`Dataset`] is an immutable table of [`Record`]s: a fixed-width numeric
//! feature vector, a binary label, and an optional ordering key used by the
//! temporal split strategies.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row} has label {label}, expected 0 or 1")]
    NonBinaryLabel { row: usize, label: u8 },

    #[error("Ordering keys must be present on every row or on none")]
    PartialOrderKeys,

    #[error("Ordering keys mix dates and sequence numbers")]
    MixedOrderKeys,

    #[error("Index {index} out of range for dataset of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Chronological position of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKey {
    /// Calendar date of the observation.
    Date(NaiveDate),
    /// Monotonically increasing sequence number.
    Sequence(u64),
}

impl OrderKey {
    fn same_kind(&self, other: &OrderKey) -> bool {
        matches!(
            (self, other),
            (OrderKey::Date(_), OrderKey::Date(_)) | (OrderKey::Sequence(_), OrderKey::Sequence(_))
        )
    }
}

/// One row of the input dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Feature vector, aligned with [`Dataset::feature_names`].
    pub features: Vec<f64>,
    /// Binary label (0 or 1).
    pub label: u8,
    /// Ordering key, required only when row order is not already chronological.
    pub order_key: Option<OrderKey>,
}

impl Record {
    pub fn new(features: Vec<f64>, label: u8) -> Self {
        Self {
            features,
            label,
            order_key: None,
        }
    }

    pub fn with_order_key(mut self, key: OrderKey) -> Self {
        self.order_key = Some(key);
        self
    }
}

/// Immutable, validated table of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset, checking row width, label domain and ordering keys.
    pub fn new(feature_names: Vec<String>, records: Vec<Record>) -> DatasetResult<Self> {
        let expected = feature_names.len();
        let mut first_key: Option<OrderKey> = None;
        let keyed = records.first().map(|r| r.order_key.is_some()).unwrap_or(false);

        for (row, record) in records.iter().enumerate() {
            if record.features.len() != expected {
                return Err(DatasetError::RaggedRow {
                    row,
                    expected,
                    found: record.features.len(),
                });
            }
            if record.label > 1 {
                return Err(DatasetError::NonBinaryLabel {
                    row,
                    label: record.label,
                });
            }
            match (&record.order_key, keyed) {
                (Some(key), true) => match &first_key {
                    Some(first) if !first.same_kind(key) => {
                        return Err(DatasetError::MixedOrderKeys)
                    }
                    Some(_) => {}
                    None => first_key = Some(*key),
                },
                (None, false) => {}
                _ => return Err(DatasetError::PartialOrderKeys),
            }
        }

        Ok(Self {
            feature_names,
            records,
        })
    }

    /// Build a dataset from parallel feature rows and labels with generated
    /// feature names (`f0`, `f1`, ...). Row order is taken as chronological.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<u8>) -> DatasetResult<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let names = (0..width).map(|i| format!("f{}", i)).collect();
        let records = rows
            .into_iter()
            .zip(labels)
            .map(|(features, label)| Record::new(features, label))
            .collect();
        Self::new(names, records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Whether rows carry explicit ordering keys.
    pub fn has_order_keys(&self) -> bool {
        self.records.first().map(|r| r.order_key.is_some()).unwrap_or(false)
    }

    /// Copy of the dataset sorted by ordering key.
    ///
    /// The sort is stable, so ties keep their original relative position.
    /// Datasets without keys are returned in row order.
    pub fn chronological(&self) -> Dataset {
        let mut records = self.records.clone();
        if self.has_order_keys() {
            records.sort_by_key(|r| r.order_key);
        }
        Dataset {
            feature_names: self.feature_names.clone(),
            records,
        }
    }

    /// Slice by an arbitrary list of row positions, preserving the list's order.
    pub fn select(&self, indices: &[usize]) -> DatasetResult<Dataset> {
        let records = indices
            .iter()
            .map(|&index| {
                self.records
                    .get(index)
                    .cloned()
                    .ok_or(DatasetError::IndexOutOfRange {
                        index,
                        len: self.records.len(),
                    })
            })
            .collect::<DatasetResult<Vec<_>>>()?;

        Ok(Dataset {
            feature_names: self.feature_names.clone(),
            records,
        })
    }

    /// Feature block as row vectors.
    pub fn features(&self) -> Vec<Vec<f64>> {
        self.records.iter().map(|r| r.features.clone()).collect()
    }

    /// Label vector.
    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Fraction of rows labelled 1.
    pub fn positive_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().filter(|r| r.label == 1).count() as f64 / self.records.len() as f64
    }
}
