//! Integration tests for the kinlink command line

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Nothing listens here, so every request fails fast with a connection error
const UNREACHABLE_API: &str = "http://127.0.0.1:1";

/// Temporary directory holding a kinlink config file
struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn with_config(contents: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, contents).unwrap();
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    /// Config pointing at a service that is not running
    fn offline() -> Self {
        Self::with_config(&format!(
            "api_url = \"{}\"\nuser_id = \"u-test\"\nrequest_timeout_secs = 2\n",
            UNREACHABLE_API
        ))
    }

    /// Run kinlink with this test env's config
    fn kinlink(&self) -> AssertCommand {
        let mut cmd = kinlink_cmd();
        cmd.args(["--config", self.config_path.to_str().unwrap()]);
        cmd
    }
}

/// Get the kinlink binary command
fn kinlink_cmd() -> AssertCommand {
    let mut cmd = AssertCommand::cargo_bin("kinlink").unwrap();
    cmd.env_remove("KINLINK_TOKEN").env_remove("KINLINK_LOG");
    // Requests to the unreachable service must fail locally, not at a proxy
    for var in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY", "http_proxy", "https_proxy", "all_proxy"] {
        cmd.env_remove(var);
    }
    cmd
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn test_validate_accepts_good_contact() {
    kinlink_cmd()
        .args([
            "validate",
            "--name",
            "Jo Ann O'Neil",
            "--phone",
            "+1 (555) 123-4567",
            "--relationship",
            "Friend",
        ])
        .assert()
        .success()
        .stdout(predicate::eq("ok\n"));
}

#[test]
fn test_validate_reports_every_field_error() {
    kinlink_cmd()
        .args(["validate", "--name", "A", "--phone", "123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Name: Name must be at least 2 characters"))
        .stderr(predicate::str::contains(
            "Phone: Phone number must contain at least 10 digits",
        ))
        .stderr(predicate::str::contains("Relationship: Please select a relationship"));
}

#[test]
fn test_validate_rejects_long_address() {
    let address = "x".repeat(201);
    kinlink_cmd()
        .args([
            "validate",
            "--name",
            "Al",
            "--phone",
            "1234567890",
            "--address",
            &address,
            "--relationship",
            "Friend",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Address must be 200 characters or less"));
}

// =============================================================================
// relationships
// =============================================================================

#[test]
fn test_relationships_without_config_prints_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    kinlink_cmd()
        .args(["--config", missing.to_str().unwrap(), "relationships"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Father\nMother\n"))
        .stdout(predicate::str::contains("Caregiver\n"))
        .stdout(predicate::str::ends_with("Other\n"));
}

#[test]
fn test_relationships_from_config() {
    let env = TestEnv::with_config("relationships = [\"Friend\", \"Doctor\"]\n");
    env.kinlink()
        .arg("relationships")
        .assert()
        .success()
        .stdout(predicate::eq("Friend\nDoctor\n"));
}

// =============================================================================
// configuration
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    kinlink_cmd()
        .args(["--config", missing.to_str().unwrap(), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn test_user_id_is_required() {
    let env = TestEnv::with_config(&format!("api_url = \"{}\"\n", UNREACHABLE_API));
    env.kinlink()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("`user_id` must be specified"));
}

#[test]
fn test_unknown_config_key_warns() {
    let env = TestEnv::with_config(&format!(
        "api_url = \"{}\"\nuser_id = \"u-test\"\ncolour = \"blue\"\n",
        UNREACHABLE_API
    ));
    // A one-character query never reaches the service
    env.kinlink()
        .args(["search", "a"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("unknown configuration key `colour`"));
}

#[test]
fn test_key_binding_collision_fails() {
    let env = TestEnv::with_config(&format!(
        "api_url = \"{}\"\nuser_id = \"u-test\"\n\n[keys.list]\nadd = \"x\"\ndelete = \"x\"\n",
        UNREACHABLE_API
    ));
    env.kinlink()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("key binding collision in [keys.list]"));
}

// =============================================================================
// service commands
// =============================================================================

#[test]
fn test_search_reports_network_error() {
    TestEnv::offline()
        .kinlink()
        .args(["search", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Network error. Please check your connection.",
        ));
}

#[test]
fn test_add_external_validates_before_calling_service() {
    TestEnv::offline()
        .kinlink()
        .args([
            "add-external",
            "--name",
            "Bob3",
            "--phone",
            "555 123 4567",
            "--relationship",
            "Neighbor",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Name: Name can only contain letters, spaces, hyphens, and apostrophes",
        ))
        .stderr(predicate::str::contains("Network error").not());
}

#[test]
fn test_add_external_network_failure_message() {
    TestEnv::offline()
        .kinlink()
        .args([
            "add-external",
            "--name",
            "Bob Ray",
            "--phone",
            "555 123 4567",
            "--relationship",
            "Neighbor",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Network error. Please check your connection and try again.",
        ));
}

#[test]
fn test_link_requires_relationship() {
    TestEnv::offline()
        .kinlink()
        .args(["link", "u-2", "--relationship", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please select a user and a relationship"));
}

#[test]
fn test_edit_external_needs_existing_contact_from_service() {
    TestEnv::offline()
        .kinlink()
        .args([
            "edit-external",
            "rel-3",
            "--name",
            "Bob Ray",
            "--phone",
            "555 123 4567",
            "--address",
            "",
            "--relationship",
            "Friend",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load connections"));
}

#[test]
fn test_link_requires_user() {
    TestEnv::offline()
        .kinlink()
        .args(["link", " ", "--relationship", "Friend"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please select a user and a relationship"));
}
