//! Source file ingestion.
//!
//! Reads a delimited file, decodes it (primary encoding with fallback),
//! normalizes every cell through the dataset [`Schema`], and replaces the
//! target collection's contents with the result. Re-running with the same
//! or a different file leaves only the latest file's records.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::encoding::{decode_with_fallback, TextEncoding};
use crate::error::IngestError;
use crate::models::Document;
use crate::schema::Schema;
use crate::store::Collection;

/// Where a dataset's rows come from and how to read them.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub schema: Schema,
    /// Tried in order; the first that decodes the whole file wins.
    pub encodings: Vec<TextEncoding>,
}

/// A parsed source file, not yet stored.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub records: Vec<Document>,
    pub encoding: TextEncoding,
    pub sha256: String,
}

/// Outcome of a full-replace load.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceResult {
    pub count: u64,
    pub encoding: TextEncoding,
    pub sha256: String,
}

/// Read, decode and type-normalize a source file.
pub fn read_source(source: &SourceSpec) -> Result<ParsedSource, IngestError> {
    if !source.path.is_file() {
        return Err(IngestError::MissingSource(source.path.clone()));
    }
    let bytes = std::fs::read(&source.path)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    let (text, encoding) =
        decode_with_fallback(&bytes, &source.encodings).ok_or_else(|| IngestError::Decode {
            path: source.path.clone(),
            encodings: source
                .encodings
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })?;
    if source.encodings.first() != Some(&encoding) {
        debug!(path = %source.path.display(), %encoding, "decoded with fallback encoding");
    }

    let records = parse_records(&text, &source.schema)?;
    Ok(ParsedSource {
        records,
        encoding,
        sha256,
    })
}

/// Parse decoded CSV text into typed records.
///
/// Rows shorter than the header yield missing values for the absent cells.
pub fn parse_records(text: &str, schema: &Schema) -> Result<Vec<Document>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let missing = schema.missing_columns(headers.iter());
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns { missing });
    }

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let doc: Document = headers
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let raw = row.get(i).unwrap_or("");
                (column.to_string(), schema.coerce(column, raw))
            })
            .collect();
        records.push(doc);
    }
    Ok(records)
}

/// Load `source` into `collection`, replacing everything it held.
pub async fn load(
    source: &SourceSpec,
    collection: &Collection<'_>,
) -> Result<ReplaceResult, IngestError> {
    let parsed = read_source(source)?;
    let count = collection
        .replace_all(&parsed.records)
        .await
        .map_err(IngestError::Store)?;

    info!(
        collection = %collection.id(),
        count,
        encoding = %parsed.encoding,
        sha256 = %parsed.sha256,
        "loaded source"
    );

    Ok(ReplaceResult {
        count,
        encoding: parsed.encoding,
        sha256: parsed.sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionId, Value};
    use crate::schema::ColumnKind;
    use crate::store::memory::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn uplink_schema() -> Schema {
        Schema::new()
            .required("device_id", ColumnKind::Text)
            .required("rssi", ColumnKind::Number)
            .optional("timestamp", ColumnKind::Timestamp { day_first: false })
    }

    fn spec(path: PathBuf) -> SourceSpec {
        SourceSpec {
            path,
            schema: uplink_schema(),
            encodings: vec![TextEncoding::Utf8, TextEncoding::Windows1252],
        }
    }

    #[test]
    fn test_parse_records_types_each_column() {
        let text = "device_id,rssi,timestamp,note\n\
                    d1,-90,2023-01-02 03:04:05,ok\n\
                    d2,bad,,\n\
                    d3\n";
        let records = parse_records(text, &uplink_schema()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["device_id"], Value::Text("d1".into()));
        assert_eq!(records[0]["rssi"], Value::Int(-90));
        assert!(matches!(records[0]["timestamp"], Value::Timestamp(_)));
        assert_eq!(records[0]["note"], Value::Text("ok".into()));
        assert_eq!(records[1]["rssi"], Value::Missing);
        assert_eq!(records[1]["timestamp"], Value::Missing);
        assert_eq!(records[2]["rssi"], Value::Missing);
        let keys: Vec<&str> = records[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["device_id", "rssi", "timestamp", "note"]);
    }

    #[test]
    fn test_missing_required_column() {
        let err = parse_records("device_id,snr\nd1,3\n", &uplink_schema()).unwrap_err();
        match err {
            IngestError::MissingColumns { missing } => assert_eq!(missing, vec!["rssi"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_source_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_source(&spec(tmp.path().join("nope.csv"))).unwrap_err();
        assert!(matches!(err, IngestError::MissingSource(_)));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_cp1252_source_is_decoded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("latin.csv");
        fs::write(&path, b"device_id,rssi\nCaf\xE9,-80\n").unwrap();
        let parsed = read_source(&spec(path)).unwrap();
        assert_eq!(parsed.encoding, TextEncoding::Windows1252);
        assert_eq!(parsed.records[0]["device_id"], Value::Text("Café".into()));
        assert_eq!(parsed.sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.csv");
        fs::write(&path, "device_id,rssi\nd1,-90\nd2,-80\nd3,-70\n").unwrap();

        let store = MemoryStore::new();
        let id = CollectionId::new("lorawan_db", "uplinks");
        let coll = Collection::new(&store, &id);

        let first = load(&spec(path.clone()), &coll).await.unwrap();
        let second = load(&spec(path), &coll).await.unwrap();
        assert_eq!(first.count, 3);
        assert_eq!(second.count, 3);
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(coll.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_second_file_replaces_first() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.csv");
        let b = tmp.path().join("b.csv");
        fs::write(&a, "device_id,rssi\na1,-90\na2,-80\na3,-70\n").unwrap();
        fs::write(&b, "device_id,rssi\nb1,-60\n").unwrap();

        let store = MemoryStore::new();
        let id = CollectionId::new("lorawan_db", "uplinks");
        let coll = Collection::new(&store, &id);

        load(&spec(a), &coll).await.unwrap();
        load(&spec(b), &coll).await.unwrap();
        assert_eq!(coll.count().await.unwrap(), 1);

        let groups = coll
            .aggregate(&crate::pipeline::Pipeline::group_by("device_id").count("n"))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].get("device_id"), &Value::Text("b1".into()));
    }

    #[tokio::test]
    async fn test_failed_read_leaves_collection_untouched() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.csv");
        fs::write(&a, "device_id,rssi\na1,-90\n").unwrap();

        let store = MemoryStore::new();
        let id = CollectionId::new("lorawan_db", "uplinks");
        let coll = Collection::new(&store, &id);
        load(&spec(a), &coll).await.unwrap();

        let err = load(&spec(tmp.path().join("gone.csv")), &coll)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingSource(_)));
        assert_eq!(coll.count().await.unwrap(), 1);
    }
}
