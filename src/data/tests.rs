use super::*;
use crate::temporal::{resolve_f64, FillPolicy};
use chrono::NaiveDate;
use flate2::write::GzEncoder;
use flate2::Compression;
use mockito::Server;
use serde_json::json;
use std::io::Write;
use tempfile::TempDir;

const NODES: &str = r#"[
    {"NodeLabel": "80202_5", "Latitude": -16.1, "Longitude": 27.4, "Population": 100},
    {"NodeLabel": 80203, "Latitude": -16.3, "Longitude": 27.6,
     "Population": {"time": true, "5": 50}}
]"#;

const TIMESERIES: &str = "date\tRDT_obs\tPrevalence\n\
20140101\t0.1\t0.3\n\
20140108\tNaN\t0.25\n\
20140115\t0.4\t\n";

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_parse_gazetteer() {
    let nodes = parse_gazetteer(NODES).unwrap();

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].label, "80202_5");
    assert_eq!(nodes[1].label, "80203");

    let population = nodes[1].attribute("Population").unwrap();
    assert_eq!(resolve_f64(population, 5, FillPolicy::NoFill), Some(50.0));
}

#[test]
fn test_parse_gazetteer_rejects_duplicate_labels() {
    let text = r#"[
        {"NodeLabel": "a", "Latitude": 0, "Longitude": 0},
        {"NodeLabel": "a", "Latitude": 1, "Longitude": 1}
    ]"#;

    let err = parse_gazetteer(text).unwrap_err();
    assert!(err.to_string().contains("Duplicate NodeLabel 'a'"));
}

#[test]
fn test_parse_gazetteer_reports_bad_record() {
    let text = r#"[{"NodeLabel": "a", "Latitude": 0}]"#;

    let err = parse_gazetteer(text).unwrap_err();
    assert!(err.to_string().contains("#0"));
}

#[test]
fn test_parse_gazetteer_requires_array() {
    assert!(parse_gazetteer(r#"{"NodeLabel": "a"}"#).is_err());
}

#[test]
fn test_parse_catalog() {
    let text = r#"[
        {"model": "model_a", "params": "<th>beta</th>", "select": [
            {"value": "Munumbwe", "name": "Munumbwe HFCA"},
            {"value": "Lukonde", "name": "Lukonde HFCA"}
        ]},
        {"model": "model_b", "select": [{"value": "Gwembe", "name": "Gwembe"}]}
    ]"#;

    let catalog = parse_catalog(text).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[1].params, "");

    assert_eq!(catalog_model(&catalog, "Lukonde"), Some("model_a"));
    assert_eq!(catalog_model(&catalog, "Gwembe"), Some("model_b"));
    assert_eq!(catalog_model(&catalog, "Nowhere"), None);
}

#[test]
fn test_parse_timeseries() {
    let table = TimeseriesTable::parse(TIMESERIES).unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(
        table.column_names().collect::<Vec<_>>(),
        vec!["RDT_obs", "Prevalence"]
    );
    assert_eq!(
        table.date_extent(),
        Some((
            NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2014, 1, 15).unwrap()
        ))
    );

    let rdt = table.column("RDT_obs").unwrap();
    assert_eq!(rdt.values, vec![Some(0.1), None, Some(0.4)]);
    assert_eq!(rdt.max(), Some(0.4));

    // Trailing empty cell
    let prevalence = table.column("Prevalence").unwrap();
    assert_eq!(prevalence.values, vec![Some(0.3), Some(0.25), None]);
}

#[test]
fn test_parse_timeseries_errors() {
    assert!(TimeseriesTable::parse("").is_err());
    assert!(TimeseriesTable::parse("day\tx\n20140101\t1\n").is_err());

    let err = TimeseriesTable::parse("date\tx\n2014-01-01\t1\n").unwrap_err();
    assert!(err.to_string().contains("row 1"));
}

#[test]
fn test_parse_heatmap() {
    let text = json!({
        "points": [
            {"x_idx": 0, "y_idx": 0, "beta": 0.1, "gamma": 1, "RDT": 0.5},
            {"x_idx": 1, "y_idx": 0, "beta": 0.2, "gamma": 1, "RDT": 2.0},
            {"x_idx": 0, "y_idx": 1, "beta": 0.1, "gamma": 2, "RDT": 8.0},
            {"x_idx": 1, "y_idx": 1, "beta": 0.2, "gamma": 2, "RDT": "n/a"}
        ]
    })
    .to_string();

    let heatmap = HeatmapData::parse(&text).unwrap();
    assert_eq!(heatmap.points.len(), 4);
    assert_eq!(heatmap.grid_side(), 2.0);
    assert_eq!(heatmap.points[2].value("gamma"), Some(2.0));
    assert_eq!(heatmap.extent("RDT"), Some((0.5, 8.0)));
    assert_eq!(heatmap.extent("missing"), None);
}

#[tokio::test]
async fn test_fs_source_reads_plain_and_gzip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("nodes.json"), NODES).unwrap();
    std::fs::write(dir.path().join("ts.tsv.gz"), gzip(TIMESERIES)).unwrap();

    let source = FsDataSource::new(dir.path());
    assert_eq!(source.name(), "fs");

    let nodes = source.fetch_json("nodes.json").await.unwrap();
    assert_eq!(nodes.as_array().map(Vec::len), Some(2));

    let text = source.fetch("ts.tsv.gz").await.unwrap();
    assert_eq!(text, TIMESERIES);
}

#[tokio::test]
async fn test_fs_source_missing_file() {
    let dir = TempDir::new().unwrap();
    let source = FsDataSource::new(dir.path());

    let err = source.fetch("absent.json").await.unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}

#[tokio::test]
async fn test_memory_source() {
    let source = MemoryDataSource::new().with_file("hm_a.json", r#"{"points": []}"#);

    let value = source.fetch_json("hm_a.json").await.unwrap();
    assert_eq!(value, json!({"points": []}));
    assert!(source.fetch("other.json").await.is_err());
}

#[tokio::test]
async fn test_http_source() {
    let mut server = Server::new_async().await;
    let _nodes = server
        .mock("GET", "/data/nodes.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(NODES)
        .create_async()
        .await;
    let _compressed = server
        .mock("GET", "/data/ts.tsv.gz")
        .with_status(200)
        .with_body(gzip(TIMESERIES))
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/data/absent.json")
        .with_status(404)
        .create_async()
        .await;

    let source = HttpDataSource::new(format!("{}/data/", server.url()));

    let nodes = parse_gazetteer(&source.fetch("nodes.json").await.unwrap()).unwrap();
    assert_eq!(nodes.len(), 2);

    let table = TimeseriesTable::parse(&source.fetch("/ts.tsv.gz").await.unwrap()).unwrap();
    assert_eq!(table.len(), 3);

    let err = source.fetch("absent.json").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}
