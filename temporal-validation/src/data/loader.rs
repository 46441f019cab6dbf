//! Dataset loader for tabular files.
//!
//! Reads CSV or Parquet files with polars and converts them into a validated
//! [`Dataset`]. The caller names the label column and, optionally, an
//! ordering column; every remaining column is used as a feature unless an
//! explicit feature list is given.
//!
//! Ordering columns may be:
//! - polars `Date` columns
//! - ISO `YYYY-MM-DD` strings
//! - integer sequence numbers

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use super::types::{Dataset, DatasetError, OrderKey, Record};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Null value in column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loader for labelled, optionally time-keyed tables.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    path: PathBuf,
    label_column: String,
    order_column: Option<String>,
    feature_columns: Option<Vec<String>>,
}

impl DatasetLoader {
    /// Create a loader for `path` using `label_column` as the target.
    pub fn new(path: impl AsRef<Path>, label_column: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            label_column: label_column.to_string(),
            order_column: None,
            feature_columns: None,
        }
    }

    /// Use `column` as the chronological ordering key.
    pub fn with_order_column(mut self, column: &str) -> Self {
        self.order_column = Some(column.to_string());
        self
    }

    /// Restrict features to the given columns, in the given order.
    pub fn with_feature_columns(mut self, columns: Vec<String>) -> Self {
        self.feature_columns = Some(columns);
        self
    }

    /// Read the file as a LazyFrame, dispatching on extension.
    pub fn load_lazy(&self) -> Result<LazyFrame, LoaderError> {
        if !self.path.exists() {
            return Err(LoaderError::FileNotFound(self.path.display().to_string()));
        }

        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let lf = match ext.as_str() {
            "csv" => LazyCsvReader::new(&self.path).with_has_header(true).finish()?,
            "parquet" => LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?,
            other => return Err(LoaderError::UnsupportedFormat(other.to_string())),
        };
        Ok(lf)
    }

    /// Load the file into a DataFrame.
    pub fn load_dataframe(&self) -> Result<DataFrame, LoaderError> {
        Ok(self.load_lazy()?.collect()?)
    }

    /// Load and convert to a [`Dataset`].
    ///
    /// The dataset is returned in file row order; call
    /// [`Dataset::chronological`] to sort by the ordering key.
    pub fn load(&self) -> Result<Dataset, LoaderError> {
        let df = self.load_dataframe()?;
        let dataset = self.dataframe_to_dataset(&df)?;
        info!(
            "Loaded {} rows x {} features from {}",
            dataset.len(),
            dataset.n_features(),
            self.path.display()
        );
        Ok(dataset)
    }

    /// Resolve which columns are features.
    fn resolve_feature_columns(&self, df: &DataFrame) -> Vec<String> {
        match &self.feature_columns {
            Some(cols) => cols.clone(),
            None => df
                .get_column_names()
                .into_iter()
                .map(|name| name.to_string())
                .filter(|name| {
                    name != &self.label_column && Some(name) != self.order_column.as_ref()
                })
                .collect(),
        }
    }

    /// Convert a DataFrame into a Dataset.
    pub fn dataframe_to_dataset(&self, df: &DataFrame) -> Result<Dataset, LoaderError> {
        let height = df.height();
        let feature_names = self.resolve_feature_columns(df);

        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(feature_names.len());
        for name in &feature_names {
            columns.push(float_column(df, name)?);
        }

        let labels = label_column(df, &self.label_column)?;
        let order_keys = match &self.order_column {
            Some(name) => Some(order_column(df, name)?),
            None => None,
        };

        let mut records = Vec::with_capacity(height);
        for row in 0..height {
            let features = columns.iter().map(|col| col[row]).collect();
            let mut record = Record::new(features, labels[row]);
            if let Some(keys) = &order_keys {
                record = record.with_order_key(keys[row]);
            }
            records.push(record);
        }

        Ok(Dataset::new(feature_names, records)?)
    }
}

fn get_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, LoaderError> {
    df.column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))
}

/// Read a numeric column as f64, rejecting nulls.
fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, LoaderError> {
    let casted = get_column(df, name)?.cast(&DataType::Float64)?;
    casted
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| LoaderError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

/// Read a 0/1 label column. Booleans and numeric encodings are accepted.
fn label_column(df: &DataFrame, name: &str) -> Result<Vec<u8>, LoaderError> {
    float_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            if value == 0.0 {
                Ok(0)
            } else if value == 1.0 {
                Ok(1)
            } else {
                Err(LoaderError::InvalidData(format!(
                    "Label column {} has value {} at row {}, expected 0 or 1",
                    name, value, row
                )))
            }
        })
        .collect()
}

/// Read an ordering column as dates or sequence numbers.
fn order_column(df: &DataFrame, name: &str) -> Result<Vec<OrderKey>, LoaderError> {
    let col = get_column(df, name)?;
    let null = |row: usize| LoaderError::NullValue {
        column: name.to_string(),
        row,
    };

    // Handle string, date and integer column types
    if let Ok(str_col) = col.str() {
        str_col
            .into_iter()
            .enumerate()
            .map(|(row, s)| {
                let s = s.ok_or_else(|| null(row))?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(OrderKey::Date)
                    .map_err(|e| {
                        LoaderError::InvalidData(format!("Invalid date {:?} at row {}: {}", s, row, e))
                    })
            })
            .collect()
    } else if let Ok(date_col) = col.date() {
        date_col
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                let days = d.ok_or_else(|| null(row))?;
                date_from_days(days).map(OrderKey::Date).ok_or_else(|| {
                    LoaderError::InvalidData(format!(
                        "Date {} days from epoch out of range at row {}",
                        days, row
                    ))
                })
            })
            .collect()
    } else {
        let casted = col.cast(&DataType::UInt64)?;
        casted
            .u64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| v.map(OrderKey::Sequence).ok_or_else(|| null(row)))
            .collect()
    }
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    days.checked_add(719_163).and_then(NaiveDate::from_num_days_from_ce_opt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_date_from_days() {
        assert_eq!(date_from_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(date_from_days(31), NaiveDate::from_ymd_opt(1970, 2, 1));
        assert!(date_from_days(i32::MAX).is_none());
        assert!(date_from_days(i32::MIN).is_none());
    }

    #[test]
    fn test_out_of_range_date_column() {
        let mut df = df!(
            "x" => [1.0f64, 2.0],
            "label" => [0i32, 1],
            "day" => [0i32, i32::MAX - 719_163]
        )
        .unwrap();
        let day = df.column("day").unwrap().cast(&DataType::Date).unwrap();
        df.with_column(day).unwrap();

        let result = DatasetLoader::new("unused.csv", "label")
            .with_order_column("day")
            .dataframe_to_dataset(&df);
        match result {
            Err(LoaderError::InvalidData(msg)) => assert!(msg.contains("row 1")),
            other => panic!("expected InvalidData, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let loader = DatasetLoader::new("/nonexistent/data.csv", "label");
        assert!(matches!(loader.load(), Err(LoaderError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"a,b\n").unwrap();
        let loader = DatasetLoader::new(file.path(), "b");
        assert!(matches!(loader.load(), Err(LoaderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_csv_with_dates() {
        let file = write_csv(
            "date,x1,x2,label\n\
             2024-01-03,1.0,2.0,1\n\
             2024-01-01,3.0,4.0,0\n\
             2024-01-02,5.0,6.0,1\n",
        );
        let ds = DatasetLoader::new(file.path(), "label")
            .with_order_column("date")
            .load()
            .unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.feature_names(), &["x1".to_string(), "x2".to_string()]);
        assert_eq!(ds.labels(), vec![1, 0, 1]);

        let sorted = ds.chronological();
        assert_eq!(sorted.labels(), vec![0, 1, 1]);
        assert_eq!(sorted.records()[0].features, vec![3.0, 4.0]);
    }

    #[test]
    fn test_explicit_feature_columns() {
        let file = write_csv("seq,x1,x2,label\n1,1.0,2.0,1\n2,3.0,4.0,0\n");
        let ds = DatasetLoader::new(file.path(), "label")
            .with_order_column("seq")
            .with_feature_columns(vec!["x2".to_string()])
            .load()
            .unwrap();
        assert_eq!(ds.n_features(), 1);
        assert_eq!(ds.records()[1].features, vec![4.0]);
        assert_eq!(ds.records()[1].order_key, Some(OrderKey::Sequence(2)));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let file = write_csv("x,label\n1.0,0\n2.0,3\n");
        let result = DatasetLoader::new(file.path(), "label").load();
        assert!(matches!(result, Err(LoaderError::InvalidData(_))));
    }

    #[test]
    fn test_missing_label_column() {
        let file = write_csv("x,y\n1.0,0\n");
        let result = DatasetLoader::new(file.path(), "label")
            .with_feature_columns(vec!["x".to_string()])
            .load();
        assert!(matches!(result, Err(LoaderError::MissingColumn(_))));
    }
}
