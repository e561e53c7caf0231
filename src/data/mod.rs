// Data file contracts and the sources they are fetched from

mod formats;
mod source;

pub use formats::{
    catalog_model, parse_catalog, parse_gazetteer, CatalogEntry, CatalogOption, HeatmapData,
    HeatmapPoint, TimeseriesColumn, TimeseriesTable, DATE_FORMAT,
};
pub use source::{DataSource, FsDataSource, HttpDataSource, MemoryDataSource};

#[cfg(test)]
mod tests;
