//! LoRaWAN uplink telemetry: per-device link quality, per-gateway climate,
//! duplicate detection and a high-temperature export.

use crate::config::Config;
use crate::encoding::TextEncoding;
use crate::loader::SourceSpec;
use crate::models::CollectionId;
use crate::pipeline::{AnalysisSpec, Pipeline, Predicate};
use crate::report::Section;
use crate::schema::{ColumnKind, Schema};

use super::{Analysis, Dataset, DatasetKind};

pub fn schema() -> Schema {
    Schema::new()
        .required("device_id", ColumnKind::Text)
        .required("gateway_id", ColumnKind::Text)
        .optional("timestamp", ColumnKind::Timestamp { day_first: false })
        .required("rssi", ColumnKind::Number)
        .required("snr", ColumnKind::Number)
        .required("temperature", ColumnKind::Number)
        .required("humidity", ColumnKind::Number)
        .optional("latitude", ColumnKind::Number)
        .optional("longitude", ColumnKind::Number)
}

pub fn dataset(config: &Config) -> Dataset {
    let cfg = &config.datasets.telemetry;

    let analyses = vec![
        Analysis::new(
            AnalysisSpec::aggregate(
                "top_devices",
                Pipeline::group_by("device_id")
                    .count("count")
                    .sort_desc("count")
                    .limit(10),
            ),
            Section::new("1. Top 10 devices with highest number of uplinks")
                .row("Device: {device_id}, Uplinks: {count}"),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "link_quality",
                Pipeline::group_by("device_id")
                    .avg("avg_rssi", "rssi")
                    .avg("avg_snr", "snr")
                    .sort_asc("avg_rssi"),
            ),
            Section::new("2. Average RSSI and SNR per device (Sorted by lowest RSSI)")
                .row("Device: {device_id}, Avg RSSI: {avg_rssi:.2}, Avg SNR: {avg_snr:.2}")
                .preview(5),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "gateway_climate",
                Pipeline::group_by("gateway_id")
                    .avg("avg_temp", "temperature")
                    .avg("avg_humidity", "humidity"),
            ),
            Section::new("3. Average Temperature and Humidity per Gateway")
                .row("Gateway: {gateway_id}, Avg Temp: {avg_temp:.2}, Avg Humidity: {avg_humidity:.2}"),
        ),
        Analysis::new(
            AnalysisSpec::aggregate(
                "duplicates",
                Pipeline::group_by("device_id")
                    .count("count")
                    .having(Predicate::gt("count", 1.0)),
            ),
            Section::new("4. Device IDs with more than one record")
                .summary("Found {total} duplicate devices.")
                .row("Duplicate Device: {device_id} (Count: {count})")
                .preview(5),
        ),
        Analysis::new(
            AnalysisSpec::find(
                "high_temperature",
                Predicate::gt("temperature", cfg.export_threshold),
                &["device_id", "latitude", "longitude", "temperature"],
            ),
            Section::new("5. Export JSON for Temperature > 35C")
                .summary("Exported {total} records to {path}"),
        )
        .export_to(config.output.dir.join(&cfg.export_file)),
    ];

    Dataset {
        kind: DatasetKind::Telemetry,
        source: SourceSpec {
            path: cfg.source.clone(),
            schema: schema(),
            encodings: vec![TextEncoding::Utf8, TextEncoding::Windows1252],
        },
        collection: CollectionId::new(&cfg.database, &cfg.collection),
        log_path: config.output.dir.join(&cfg.log_file),
        announce_loading: false,
        analyses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_follows_threshold_and_output_dir() {
        let mut config = Config::default();
        config.output.dir = "out".into();
        config.datasets.telemetry.export_threshold = 30.0;
        let dataset = dataset(&config);

        let export = dataset.analyses.last().unwrap();
        assert_eq!(
            export.export.as_deref(),
            Some(std::path::Path::new("out/high_temp_devices.json"))
        );
        match &export.spec.query {
            crate::pipeline::Query::Find(q) => {
                assert_eq!(q.filter.value, 30.0);
                assert_eq!(
                    q.projection,
                    vec!["device_id", "latitude", "longitude", "temperature"]
                );
            }
            other => panic!("expected find query, got {:?}", other),
        }
    }

    #[test]
    fn test_section_titles_in_order() {
        let titles: Vec<String> = dataset(&Config::default())
            .analyses
            .iter()
            .map(|a| a.section.title.clone())
            .collect();
        assert_eq!(titles.len(), 5);
        for (i, title) in titles.iter().enumerate() {
            assert!(title.starts_with(&format!("{}. ", i + 1)), "{}", title);
        }
    }
}
