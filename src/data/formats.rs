use crate::entity::Entity;
use crate::temporal::as_number;
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Date format of the `date` column in time-series files
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Parse a node file: a JSON array of node records with unique labels
pub fn parse_gazetteer(text: &str) -> Result<Vec<Entity>> {
    let records: Vec<Value> =
        serde_json::from_str(text).context("Node file must be a JSON array of records")?;

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        let node = Entity::from_record(record).with_context(|| format!("Invalid node record #{}", i))?;
        if !seen.insert(node.label.clone()) {
            bail!("Duplicate NodeLabel '{}' in node record #{}", node.label, i);
        }
        nodes.push(node);
    }

    Ok(nodes)
}

/// One selectable option of a catalog entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogOption {
    pub value: String,
    pub name: String,
}

/// A model in the gazetteer catalog with its parameter header and options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub model: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub select: Vec<CatalogOption>,
}

/// Parse the gazetteer catalog (JSON array of models and their options)
pub fn parse_catalog(text: &str) -> Result<Vec<CatalogEntry>> {
    serde_json::from_str(text).context("Failed to parse gazetteer catalog")
}

/// Model owning the catalog option `value`
pub fn catalog_model<'a>(catalog: &'a [CatalogEntry], value: &str) -> Option<&'a str> {
    catalog
        .iter()
        .find(|entry| entry.select.iter().any(|option| option.value == value))
        .map(|entry| entry.model.as_str())
}

/// A value column of a time-series file
#[derive(Clone, Debug, PartialEq)]
pub struct TimeseriesColumn {
    pub name: String,
    /// One entry per row; `None` where the cell is not numeric
    pub values: Vec<Option<f64>>,
}

impl TimeseriesColumn {
    pub fn max(&self) -> Option<f64> {
        self.values.iter().flatten().copied().reduce(f64::max)
    }
}

/// Tab-separated time series: `date\tcol1\tcol2...`, one row per time step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeseriesTable {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<TimeseriesColumn>,
}

impl TimeseriesTable {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let header = lines.next().ok_or_else(|| anyhow!("Time-series file is empty"))?;
        let mut names = header.split('\t').map(str::trim);
        match names.next() {
            Some("date") => {}
            other => bail!("Time-series header must start with 'date', got {:?}", other),
        }

        let mut columns: Vec<TimeseriesColumn> = names
            .map(|name| TimeseriesColumn {
                name: name.to_string(),
                values: Vec::new(),
            })
            .collect();
        let mut dates = Vec::new();

        for (row, line) in lines.enumerate() {
            let mut cells = line.split('\t').map(str::trim);
            let raw_date = cells.next().unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
                .with_context(|| format!("Invalid date '{}' in row {}", raw_date, row + 1))?;
            dates.push(date);

            for column in columns.iter_mut() {
                let value = cells
                    .next()
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .filter(|v| v.is_finite());
                column.values.push(value);
            }
        }

        Ok(Self { dates, columns })
    }

    /// Number of rows (time steps)
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&TimeseriesColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// First and last date
    pub fn date_extent(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }
}

/// A heatmap cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub x_idx: usize,
    pub y_idx: usize,

    /// Parameter and value fields, named by the widget configuration
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl HeatmapPoint {
    pub fn value(&self, attr: &str) -> Option<f64> {
        self.fields.get(attr).and_then(as_number)
    }
}

/// Heatmap file: `{"points": [...]}` on a square grid
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapData {
    pub points: Vec<HeatmapPoint>,
}

impl HeatmapData {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse heatmap JSON")
    }

    /// Cells per side of the grid
    pub fn grid_side(&self) -> f64 {
        (self.points.len() as f64).sqrt()
    }

    /// Min and max of a numeric field over all points
    pub fn extent(&self, attr: &str) -> Option<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|p| p.value(attr))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
