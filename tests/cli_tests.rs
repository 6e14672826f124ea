//! Tests for the `efiso` binary: exit codes and output.

mod helpers;

use std::fs;
use std::process::{Command, Output};

use helpers::{assert_file_exists, assert_not_exists, create_dummy_efi, TestEnv};

fn efiso(env: &TestEnv, args: &[&str], vars: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_efiso"));
    cmd.args(args).current_dir(&env.root);
    for (key, _) in std::env::vars().filter(|(k, _)| k.starts_with("EFISO_")) {
        cmd.env_remove(key);
    }
    cmd.env("EFISO_SCRATCH_DIR", &env.scratch);
    for (key, value) in vars {
        cmd.env(key, value);
    }
    cmd.output().expect("failed to run efiso")
}

#[test]
fn test_build_exit_zero() {
    let env = TestEnv::new();
    let xorriso = env.fake_xorriso();
    let efi = create_dummy_efi(&env.root, "hello_uefi.efi", 64 * 1024);

    let out = efiso(
        &env,
        &["build", efi.to_str().unwrap(), "--quiet"],
        &[("EFISO_XORRISO", xorriso.to_str().unwrap())],
    );

    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    // Default output is <stem>.iso in the working directory
    let iso = env.root.join("hello_uefi.iso");
    assert_file_exists(&iso);
    assert_eq!(fs::read(&iso).unwrap(), fs::read(&efi).unwrap());
}

#[test]
fn test_build_json_with_checksum() {
    let env = TestEnv::new();
    let xorriso = env.fake_xorriso();
    let efi = create_dummy_efi(&env.root, "app.efi", 4096);
    let iso = env.output("app.iso");

    let out = efiso(
        &env,
        &[
            "build",
            efi.to_str().unwrap(),
            "-o",
            iso.to_str().unwrap(),
            "--checksum",
            "--json",
        ],
        &[("EFISO_XORRISO", xorriso.to_str().unwrap())],
    );

    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["size"], 4096);
    assert_eq!(summary["backend"], "xorriso");
    assert_eq!(summary["stages"][6], "DONE");

    let sha = summary["sha512"].as_str().unwrap();
    let checksum = fs::read_to_string(env.output("app.iso.sha512")).unwrap();
    assert_eq!(checksum, format!("{}  app.iso\n", sha));
}

#[test]
fn test_missing_dependency_exit_code() {
    let env = TestEnv::new();
    let efi = create_dummy_efi(&env.root, "test.efi", 1024);
    let iso = env.output("out.iso");

    let out = efiso(
        &env,
        &["build", efi.to_str().unwrap(), "-o", iso.to_str().unwrap()],
        &[("EFISO_XORRISO", "/nonexistent/bin/xorriso")],
    );

    assert_eq!(out.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("missing dependency"));
    assert_not_exists(&iso);
    assert_not_exists(&env.scratch);
}

#[test]
fn test_missing_input_exit_code() {
    let env = TestEnv::new();
    let xorriso = env.fake_xorriso();

    let out = efiso(
        &env,
        &["build", "does-not-exist.efi"],
        &[("EFISO_XORRISO", xorriso.to_str().unwrap())],
    );

    assert_eq!(out.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing input artifact"));
    assert_not_exists(&env.root.join("does-not-exist.iso"));
}

#[test]
fn test_image_generation_exit_code() {
    let env = TestEnv::new();
    let xorriso = env.failing_tool("xorriso");
    let efi = create_dummy_efi(&env.root, "test.efi", 1024);
    let iso = env.output("out.iso");

    let out = efiso(
        &env,
        &["build", efi.to_str().unwrap(), "-o", iso.to_str().unwrap()],
        &[("EFISO_XORRISO", xorriso.to_str().unwrap())],
    );

    assert_eq!(out.status.code(), Some(6));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("image generation failed"));
    assert!(stderr.contains("Cannot find boot image"));
    assert_not_exists(&iso);
    assert_eq!(env.scratch_entries(), 0);
}

#[test]
fn test_timeout_exit_code() {
    let env = TestEnv::new();
    let xorriso = env.hanging_tool("xorriso");
    let efi = create_dummy_efi(&env.root, "test.efi", 1024);

    let out = efiso(
        &env,
        &["build", efi.to_str().unwrap(), "--timeout", "1"],
        &[("EFISO_XORRISO", xorriso.to_str().unwrap())],
    );

    assert_eq!(out.status.code(), Some(7));
    assert_eq!(env.scratch_entries(), 0);
}

#[test]
fn test_preflight_reports_missing() {
    let env = TestEnv::new();

    let out = efiso(
        &env,
        &["preflight"],
        &[("EFISO_XORRISO", "/nonexistent/bin/xorriso")],
    );

    assert_eq!(out.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[FAIL] /nonexistent/bin/xorriso"));
}

#[test]
fn test_show_grub_cfg() {
    let env = TestEnv::new();

    let out = efiso(&env, &["show", "grub-cfg"], &[("EFISO_MENU_TIMEOUT", "3")]);

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout, efiso::grub::render_grub_cfg(3, "/EFI/BOOT/BOOTX64.EFI"));
}

#[test]
fn test_bad_config_exit_code() {
    let env = TestEnv::new();

    let out = efiso(&env, &["show", "config"], &[("EFISO_BACKEND", "floppy")]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown backend"));
}
