//! Integration test to verify the --version flag shows the correct version from Cargo.toml

use std::process::Command;

#[test]
fn version_flag_shows_cargo_version() {
    let cargo_version = env!("CARGO_PKG_VERSION");

    let output = Command::new(env!("CARGO_BIN_EXE_camera-sweep-client"))
        .arg("--version")
        .output()
        .expect("Failed to execute camera-sweep-client --version");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "camera-sweep-client --version should exit successfully"
    );
    assert!(
        stdout.contains(cargo_version),
        "Output '{}' should contain version '{}'",
        stdout.trim(),
        cargo_version
    );
    assert!(
        stdout.contains("camera-sweep-client"),
        "Output '{}' should contain 'camera-sweep-client'",
        stdout.trim()
    );
}

#[test]
fn zero_images_is_refused_before_contacting_the_server() {
    let output = Command::new(env!("CARGO_BIN_EXE_camera-sweep-client"))
        .args(["--images", "0"])
        .output()
        .expect("Failed to execute camera-sweep-client --images 0");

    assert_eq!(output.status.code(), Some(1));
}
