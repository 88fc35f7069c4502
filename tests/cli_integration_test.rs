//! CLI Integration Test
//!
//! Runs the compiled binary against a temporary config and data directory.
//! Only offline commands are exercised; nothing here talks to a node.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const OWNER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const ESCROW: &str = "0x1111111111111111111111111111111111111111";
const REGISTRY: &str = "0x2222222222222222222222222222222222222222";

/// Helper to run CLI commands and capture output
struct CliRunner {
    _temp_dir: TempDir,
    config_path: PathBuf,
    data_dir: PathBuf,
}

impl CliRunner {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("deployments.json"),
            format!(
                r#"{{ "31337": {{ "escrow": "{}", "registry": "{}" }} }}"#,
                ESCROW, REGISTRY
            ),
        )
        .unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
            data_dir,
        }
    }

    fn command(&self, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_study-wizard"))
            .arg("--config")
            .arg(&self.config_path)
            .arg("--data-dir")
            .arg(&self.data_dir)
            .args(args)
            .env("RUST_LOG", "warn")
            .env_remove("RPC_URL")
            .env_remove("CHAIN_ID")
            .output()
            .expect("Failed to execute CLI")
    }

    /// Run a command and return stdout, failing the test on a non-zero exit
    fn run(&self, args: &[&str]) -> String {
        let output = self.command(args);
        assert!(
            output.status.success(),
            "CLI command {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run with `--json` and return the parsed envelope
    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        let output = self.command(&full);
        serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
            panic!(
                "Invalid JSON from {:?}: {}\n{}",
                args,
                e,
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }

    fn write_input(&self, name: &str, json: &str) -> PathBuf {
        let path = self.data_dir.join(name);
        std::fs::write(&path, json).unwrap();
        path
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_config_init_writes_file() {
    let cli = CliRunner::new();

    let out = cli.run(&["config", "init", "--network", "local"]);

    assert!(out.contains("Configuration initialized"));
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cli.config_path).unwrap()).unwrap();
    assert_eq!(saved["chain"]["chain_id"], 31337);
}

#[test]
fn test_invalid_network_fails() {
    let cli = CliRunner::new();

    let output = cli.command(&["--network", "regtest", "session", "list"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid network"));
}

#[test]
fn test_session_build_and_submit_flow() {
    let cli = CliRunner::new();

    let started = cli.run_json(&["session", "start", "--owner", OWNER]);
    assert_eq!(started["success"], true);
    let session_id = started["data"]["id"].as_str().unwrap().to_string();

    let escrow = cli.write_input(
        "escrow.json",
        r#"{ "step": "escrow", "title": "Sleep study", "totalFunding": "500", "maxParticipants": 40 }"#,
    );

    let built = cli.run_json(&["step", "build", &session_id, "--input", path_str(&escrow)]);
    assert_eq!(built["success"], true);
    assert_eq!(built["data"]["to"].as_str().unwrap().to_lowercase(), ESCROW);
    assert_eq!(built["data"]["value"], "500");
    assert_eq!(built["data"]["function"], "createStudyEscrow");

    let tx = format!("0x{}", "ab".repeat(32));
    let submitted = cli.run_json(&[
        "step",
        "submit",
        &session_id,
        "--input",
        path_str(&escrow),
        "--tx-hash",
        &tx,
    ]);
    assert_eq!(submitted["data"]["alreadySubmitted"], false);

    // Same hash again is reported, not rejected
    let again = cli.run_json(&[
        "step",
        "submit",
        &session_id,
        "--input",
        path_str(&escrow),
        "--tx-hash",
        &tx,
    ]);
    assert_eq!(again["data"]["alreadySubmitted"], true);

    let shown = cli.run(&["session", "show", &session_id]);
    assert!(shown.contains("Awaiting confirmation"));

    let listed = cli.run(&["session", "list"]);
    assert!(listed.contains(&session_id));
}

#[test]
fn test_building_out_of_order_fails() {
    let cli = CliRunner::new();
    let started = cli.run_json(&["session", "start", "--owner", OWNER]);
    let session_id = started["data"]["id"].as_str().unwrap().to_string();
    let registry = cli.write_input(
        "registry.json",
        r#"{ "step": "registry", "title": "Sleep study" }"#,
    );

    let envelope = cli.run_json(&["step", "build", &session_id, "--input", path_str(&registry)]);

    assert_eq!(envelope["success"], false);
    assert!(envelope["error"].as_str().unwrap().contains("escrow is not confirmed"));
}

#[test]
fn test_study_show_without_entry_fails() {
    let cli = CliRunner::new();
    let started = cli.run_json(&["session", "start", "--owner", OWNER]);
    let session_id = started["data"]["id"].as_str().unwrap().to_string();

    let output = cli.command(&["study", "show", &session_id]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No index entry"));
}
