use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const UPLINKS: &str = "\
device_id,gateway_id,timestamp,rssi,snr,temperature,humidity,latitude,longitude
d1,g1,2023-05-01T10:00:00Z,-100,5.5,36.5,40,10.1,20.2
d1,g1,2023-05-01T10:05:00Z,-90,6.5,30.0,42,10.1,20.2
d2,g2,2023-05-01T10:10:00Z,-70,8.0,20.0,50,11.0,21.0
d3,g1,2023-05-01T10:15:00Z,-80,7.0,40.0,44,12.0,22.0
";

/// Orders file with one Windows-1252 byte (0xE9, `é`) so UTF-8 decoding
/// fails and the fallback is exercised.
const ORDERS: &[u8] = b"\
Order Date,Product ID,Category,Sub-Category,Sales
08/11/2016,P1,Furniture,Chairs,1000.5
08/11/2016,P2,Furniture,Tables,2000
12/06/2016,P1,Office,Pap\xE9r,50
01/02/2017,P3,Office,Pap\xE9r,200
15/03/2017,P2,Furniture,Chairs,3000
";

struct Workspace {
    _tmp: TempDir,
    root: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn results(&self) -> PathBuf {
        self.root.join("Results")
    }

    fn read_result(&self, name: &str) -> String {
        fs::read_to_string(self.results().join(name))
            .unwrap_or_else(|e| panic!("missing result {}: {}", name, e))
    }
}

fn setup_test_env() -> Workspace {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(root.join("lorawan_uplink_devices.csv"), UPLINKS).unwrap();
    fs::write(root.join("orders.csv"), ORDERS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docpipe.sqlite"

[output]
dir = "{root}/Results"

[datasets.telemetry]
source = "{root}/lorawan_uplink_devices.csv"

[datasets.sales]
source = "{root}/orders.csv"
"#,
        root = root.display()
    );

    let config = config_dir.join("docpipe.toml");
    fs::write(&config, config_content).unwrap();

    Workspace {
        _tmp: tmp,
        root,
        config,
    }
}

fn run_docpipe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_docpipe");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docpipe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let ws = setup_test_env();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_docpipe(&ws.config, &["init"]);
    assert!(success, "second init failed (not idempotent)");
    assert!(ws.root.join("data/docpipe.sqlite").exists());
}

#[test]
fn test_run_telemetry() {
    let ws = setup_test_env();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["run", "telemetry"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);

    let log_path = ws.results().join("task1_output.txt");
    assert!(stdout.contains(&format!(
        "Running telemetry... Output will be saved to {}",
        log_path.display()
    )));
    assert!(stdout.contains("telemetry completed."));

    let log = ws.read_result("task1_output.txt");
    assert!(log.starts_with("Inserted 4 records into 'uplinks'.\n"));
    assert!(log.contains("\n--- 1. Top 10 devices with highest number of uplinks ---\nDevice: d1, Uplinks: 2\n"));
    assert!(log.contains(
        "\n--- 2. Average RSSI and SNR per device (Sorted by lowest RSSI) ---\n\
         Device: d1, Avg RSSI: -95.00, Avg SNR: 6.00\n\
         Device: d3, Avg RSSI: -80.00, Avg SNR: 7.00\n\
         Device: d2, Avg RSSI: -70.00, Avg SNR: 8.00\n"
    ));
    assert!(log.contains("Gateway: g1, Avg Temp: 35.50, Avg Humidity: 42.00\n"));
    assert!(log.contains("Gateway: g2, Avg Temp: 20.00, Avg Humidity: 50.00\n"));
    assert!(log.contains(
        "\n--- 4. Device IDs with more than one record ---\n\
         Found 1 duplicate devices.\n\
         Duplicate Device: d1 (Count: 2)\n"
    ));

    let export_path = ws.results().join("high_temp_devices.json");
    assert!(log.contains(&format!(
        "\n--- 5. Export JSON for Temperature > 35C ---\nExported 2 records to {}\n",
        export_path.display()
    )));

    let export = fs::read_to_string(&export_path).unwrap();
    assert!(export.starts_with("[\n    {\n        \"device_id\": \"d1\",\n"));
    let rows: serde_json::Value = serde_json::from_str(&export).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let ids: Vec<&str> = rows.iter().map(|r| r["device_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["d1", "d3"]);
    for row in rows {
        let keys: Vec<&String> = row.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert!(row.get("_id").is_none());
        assert!(row["temperature"].as_f64().unwrap() > 35.0);
    }
}

#[test]
fn test_rerun_is_idempotent() {
    let ws = setup_test_env();

    let (_, stderr, success) = run_docpipe(&ws.config, &["run", "telemetry"]);
    assert!(success, "first run failed: {}", stderr);
    let first = ws.read_result("task1_output.txt");

    let (_, stderr, success) = run_docpipe(&ws.config, &["run", "telemetry"]);
    assert!(success, "second run failed: {}", stderr);
    let second = ws.read_result("task1_output.txt");

    assert_eq!(first, second);
    assert!(second.starts_with("Inserted 4 records into 'uplinks'.\n"));

    let (stdout, _, success) = run_docpipe(&ws.config, &["stats"]);
    assert!(success);
    assert!(stdout.contains("lorawan_db.uplinks"));
    let uplinks_line = stdout
        .lines()
        .find(|l| l.contains("lorawan_db.uplinks"))
        .unwrap();
    assert!(uplinks_line.trim_end().ends_with(" 4"), "{}", uplinks_line);
}

#[test]
fn test_run_sales_with_cp1252_source() {
    let ws = setup_test_env();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["run", "sales"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sales completed."));

    let log = ws.read_result("task2_output.txt");
    assert!(log.starts_with("Loading data...\nInserted 5 records into 'orders'.\n"));
    assert!(log.contains(
        "\n--- 1. Top 5 Products by Total Sales ---\n\
         Product ID: P2, Total Sales: $5,000.00\n\
         Product ID: P1, Total Sales: $1,050.50\n\
         Product ID: P3, Total Sales: $200.00\n"
    ));
    assert!(log.contains(
        "\n--- 2. Total Revenue per Month (Year-Month) ---\n\
         2016-06: $50.00\n\
         2016-11: $3,000.50\n\
         2017-02: $200.00\n\
         2017-03: $3,000.00\n\
         ... (Total 4 months)\n"
    ));
    assert!(log.contains("\nCategory: Office\n  - Papér: $125.00\n"));
    assert!(log.contains("\nCategory: Furniture\n"));
    assert!(log.contains("  - Chairs: $2,000.25\n"));
    assert!(log.contains("  - Tables: $2,000.00\n"));
    assert!(log.ends_with(
        "\n--- 4. Yearly Sales Growth ---\n\
         Year   | Total Sales     | Growth %  \n\
         -----------------------------------\n\
         2016   | $3,050.50    | N/A       \n\
         2017   | $3,200.00    | +4.90%    \n"
    ));
}

#[test]
fn test_missing_source_is_logged() {
    let ws = setup_test_env();
    fs::remove_file(ws.root.join("lorawan_uplink_devices.csv")).unwrap();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["run", "telemetry"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);

    let log = ws.read_result("task1_output.txt");
    let missing = ws.root.join("lorawan_uplink_devices.csv");
    assert!(log.starts_with(&format!("File {} not found.\n", missing.display())));
    assert!(log.contains("Found 0 duplicate devices.\n"));
    let export = fs::read_to_string(ws.results().join("high_temp_devices.json")).unwrap();
    assert_eq!(export, "[]");
}

#[test]
fn test_dry_run_writes_nothing() {
    let ws = setup_test_env();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["run", "all", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("telemetry: 4 records parsed"));
    assert!(stdout.contains("sales: 5 records parsed"));
    assert!(stdout.contains("(cp1252)"));
    assert!(!ws.results().exists());
    assert!(!ws.root.join("data/docpipe.sqlite").exists());
}

#[test]
fn test_failed_dataset_does_not_stop_the_next() {
    let ws = setup_test_env();
    fs::create_dir_all(ws.results().join("task1_output.txt")).unwrap();

    let (stdout, stderr, success) = run_docpipe(&ws.config, &["run", "all"]);
    assert!(!success, "run should fail: stdout={}", stdout);
    assert!(!stdout.contains("telemetry completed."));
    assert!(stdout.contains("sales completed."));
    assert!(stderr.contains("1 of 2 datasets failed: telemetry: "), "{}", stderr);

    let log = ws.read_result("task2_output.txt");
    assert!(log.starts_with("Loading data...\nInserted 5 records into 'orders'.\n"));
}

#[test]
fn test_unknown_dataset_fails() {
    let ws = setup_test_env();

    let (_, stderr, success) = run_docpipe(&ws.config, &["run", "weather"]);
    assert!(!success);
    assert!(stderr.contains("Unknown dataset"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let ws = setup_test_env();

    let (_, stderr, success) = run_docpipe(&ws.root.join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
