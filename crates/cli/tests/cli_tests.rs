//! CLI integration tests

use std::process::Command;

fn cra(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cra"))
        .args(args)
        .env_remove("CRA_API_URL")
        .env_remove("CRA_GUILD")
        .env_remove("CRA_CHANNEL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = cra(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Cloud Run Autoscaler"),
        "Should show app name"
    );
    assert!(stdout.contains("services"), "Should show services command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("report"), "Should show report command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = cra(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("cra"), "Should show binary name");
}

/// Test services register subcommand help
#[test]
fn test_services_register_help() {
    let output = cra(&["services", "register", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Register help should succeed");
    assert!(stdout.contains("--project"), "Should show project option");
    assert!(stdout.contains("--region"), "Should show region option");
    assert!(stdout.contains("--guild"), "Should show guild option");
    assert!(stdout.contains("--channel"), "Should show channel option");
}

/// Test services list subcommand help
#[test]
fn test_services_list_help() {
    let output = cra(&["services", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "List help should succeed");
    assert!(stdout.contains("--channel"), "Should show channel option");
}

/// Test report scan subcommand help
#[test]
fn test_report_scan_help() {
    let output = cra(&["report", "scan", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Scan help should succeed");
    assert!(stdout.contains("--file"), "Should show file option");
}

/// Test format option is accepted
#[test]
fn test_format_option() {
    let output = cra(&["--format", "json", "--help"]);
    assert!(output.status.success(), "Format option should be accepted");

    let output = cra(&["--format", "yaml", "health"]);
    assert!(!output.status.success(), "Unknown format should fail");
}

/// Test api-url option is shown
#[test]
fn test_api_url_option() {
    let output = cra(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("CRA_API_URL"), "Should mention env var");
}

/// Test invalid command fails
#[test]
fn test_invalid_command() {
    let output = cra(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

/// Test missing argument fails
#[test]
fn test_missing_argument() {
    // register requires a service name and project
    let output = cra(&["services", "register"]);
    assert!(!output.status.success(), "Missing argument should fail");
}
