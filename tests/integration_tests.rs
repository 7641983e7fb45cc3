mod common;

use assert_cmd::Command;
use common::*;
use predicates::prelude::*;
use std::fs;

fn cmd() -> Command {
    Command::cargo_bin("asset-squeeze").unwrap()
}

/// Lets the small fixtures cross the size threshold and be resized.
fn write_small_tier_config(root: &std::path::Path) {
    fs::write(
        root.join("asset-squeeze.toml"),
        "[tiers.standard]\nmax_width = 160\nthreshold_kb = 0\neffort = 1\n",
    )
    .unwrap();
}

#[test]
fn test_cli_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_subcommand_help() {
    for sub in ["optimize", "responsive", "composite", "info", "tiers"] {
        cmd().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_no_arguments_prints_usage() {
    cmd()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_root_fails() {
    cmd()
        .arg("/nonexistent/asset-squeeze-root")
        .assert()
        .failure();
}

#[test]
fn test_empty_root_succeeds() {
    let temp_dir = create_temp_directory();
    cmd()
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No image files"));
}

#[test]
fn test_optimize_site_tree() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    create_site_tree(root);
    write_small_tier_config(root);
    let lobby_before = fs::read(root.join("lobby-optimized.webp")).unwrap();

    cmd()
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary"))
        .stdout(predicate::str::contains("Files processed: 2"));

    assert!(root.join("rooms/suite-optimized.webp").exists());
    assert!(root.join("rooms/deluxe-optimized.webp").exists());
    assert!(!root.join("rooms/suite.png").exists());
    assert!(!root.join("rooms/deluxe.jpg").exists());
    assert!(!root.join("Screenshot 2024-01-02 at 10.00.00.png").exists());
    assert_eq!(fs::read(root.join("lobby-optimized.webp")).unwrap(), lobby_before);

    let (width, _) = image::image_dimensions(root.join("rooms/suite-optimized.webp")).unwrap();
    assert_eq!(width, 160);
}

#[test]
fn test_second_run_changes_nothing() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    create_site_tree(root);
    write_small_tier_config(root);

    cmd().arg(root).assert().success();
    let after_first = snapshot(root);

    cmd().arg(root).assert().success();
    assert_eq!(snapshot(root), after_first);
}

#[test]
fn test_duplicate_original_is_removed() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    write_jpeg(&root.join("room.jpg"), 400, 300);
    write_webp(&root.join("room-optimized.webp"), 200, 150);
    let optimized_before = fs::read(root.join("room-optimized.webp")).unwrap();

    cmd()
        .args(["optimize", &root.to_string_lossy(), "--report-json"])
        .arg(root.join("report.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));

    assert!(!root.join("room.jpg").exists());
    assert_eq!(fs::read(root.join("room-optimized.webp")).unwrap(), optimized_before);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["totals"]["processed"], 0);
    assert_eq!(report["counters"]["deleted_duplicates"], 1);
}

#[test]
fn test_hero_tier_downscales_large_source() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    let source = write_png(&root.join("facade.png"), 3000, 2000);
    let before = fs::metadata(&source).unwrap().len();

    cmd()
        .args(["-q", "optimize", &root.to_string_lossy(), "--tier", "hero"])
        .assert()
        .success();

    let output = root.join("facade-optimized.webp");
    let (width, height) = image::image_dimensions(&output).unwrap();
    assert_eq!((width, height), (1920, 1280));
    assert!(fs::metadata(&output).unwrap().len() < before);
    assert!(!source.exists());
}

#[test]
fn test_dry_run_touches_nothing() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    create_site_tree(root);
    write_small_tier_config(root);
    let before = snapshot(root);

    cmd()
        .args(["optimize", &root.to_string_lossy(), "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would transcode"))
        .stdout(predicate::str::contains("would remove screenshot/UUID file"));

    assert_eq!(snapshot(root), before);
}

#[test]
fn test_keep_originals_and_derivatives() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    write_png(&root.join("pool.png"), 320, 240);
    write_small_tier_config(root);

    cmd()
        .args([
            "optimize",
            &root.to_string_lossy(),
            "--originals",
            "keep",
            "--variants",
            "mobile,placeholder",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Derivatives written: 2"));

    assert!(root.join("pool.png").exists());
    assert!(root.join("pool-optimized.webp").exists());
    assert!(root.join("pool-mobile.webp").exists());
    let (width, _) = image::image_dimensions(root.join("pool-placeholder.webp")).unwrap();
    assert_eq!(width, 40);
}

#[test]
fn test_optimized_tier_rejected_as_variant() {
    let temp_dir = create_temp_directory();
    cmd()
        .args(["optimize", &temp_dir.path().to_string_lossy(), "--variants", "hero"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used as a variant"));
}

#[test]
fn test_placeholder_tier_leaves_original() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    let source = write_png(&root.join("suite.png"), 1200, 800);

    cmd()
        .args(["-q", "optimize", &root.to_string_lossy(), "--tier", "placeholder"])
        .assert()
        .success();

    assert!(source.exists());
    assert!(!root.join("suite-optimized.webp").exists());
    let (width, _) = image::image_dimensions(root.join("suite-placeholder.webp")).unwrap();
    assert_eq!(width, 40);
}

#[test]
fn test_in_place_rejects_reduced_tier() {
    let temp_dir = create_temp_directory();
    cmd()
        .args([
            "optimize",
            &temp_dir.path().to_string_lossy(),
            "--tier",
            "mobile",
            "--mode",
            "in-place",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot replace originals in place"));
}

#[test]
fn test_unknown_tier_fails() {
    let temp_dir = create_temp_directory();
    cmd()
        .args(["optimize", &temp_dir.path().to_string_lossy(), "--tier", "poster"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown compression tier"));
}

#[test]
fn test_corrupt_file_sets_exit_status() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    fs::write(root.join("broken.jpg"), b"fake image data").unwrap();
    write_png(&root.join("fine.png"), 320, 240);
    write_small_tier_config(root);

    cmd()
        .arg(root)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed files: 1"));

    assert!(root.join("fine-optimized.webp").exists());
    assert!(root.join("broken.jpg").exists());
}

#[test]
fn test_tiers_listing() {
    cmd()
        .arg("tiers")
        .assert()
        .success()
        .stdout(predicate::str::contains("hero"))
        .stdout(predicate::str::contains("placeholder"));
}

#[test]
fn test_info_on_real_image() {
    let temp_dir = create_temp_directory();
    let path = write_png(&temp_dir.path().join("suite.png"), 320, 240);

    cmd()
        .args(["info", &path.to_string_lossy()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logical name: suite"))
        .stdout(predicate::str::contains("320x240"));
}

#[test]
fn test_info_nonexistent_file() {
    cmd().args(["info", "nonexistent.jpg"]).assert().failure();
}

#[test]
fn test_ad_hoc_composite() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    let a = write_jpeg(&root.join("pool.jpg"), 300, 200);
    let b = write_jpeg(&root.join("spa.jpg"), 200, 300);

    cmd()
        .args(["composite", "--label", "wellness", "--width", "400", "--height", "200"])
        .arg("-o")
        .arg(root)
        .arg(&a)
        .arg(&b)
        .assert()
        .success();

    let dims = image::image_dimensions(root.join("wellness-composite.webp")).unwrap();
    assert_eq!(dims, (428, 228));
}

#[test]
fn test_composite_needs_a_name() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    let a = write_jpeg(&root.join("pool.jpg"), 300, 200);
    let b = write_jpeg(&root.join("spa.jpg"), 200, 300);

    cmd().arg("composite").arg(&a).arg(&b).assert().failure();
}

#[test]
fn test_composite_plan_file() {
    let temp_dir = create_temp_directory();
    let root = temp_dir.path();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        write_jpeg(&root.join(name), 240, 160);
    }
    let plan = root.join("asset-squeeze.toml");
    fs::write(
        &plan,
        r#"
[[composites]]
triptych = 2
layout = "asymmetric"
sources = ["a.jpg", "b.jpg", "c.jpg"]
width = 600
height = 300
"#,
    )
    .unwrap();

    cmd()
        .args(["composite", "--plan"])
        .arg(&plan)
        .assert()
        .success();

    let dims = image::image_dimensions(root.join("hero-triptych-2.webp")).unwrap();
    assert_eq!(dims, (628, 328));
}

#[test]
fn test_responsive_cdn_url() {
    cmd()
        .args([
            "responsive",
            "https://cdn.sanity.io/images/abc/production/lobby.jpg?w=300",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "srcset=\"https://cdn.sanity.io/images/abc/production/lobby.jpg?w=640&q=82&fm=webp 640w",
        ))
        .stdout(predicate::str::contains("?w=300&").not());
}

#[test]
fn test_responsive_unknown_host_fails() {
    cmd()
        .args(["responsive", "https://example.org/lobby.jpg"])
        .assert()
        .code(1);
}

#[test]
fn test_responsive_local_variants() {
    let temp_dir = create_temp_directory();
    let path = write_png(&temp_dir.path().join("terrace.png"), 1200, 80);

    cmd()
        .args(["-q", "responsive", &path.to_string_lossy(), "--base-url", "/img/"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "srcset=\"/img/terrace-640w.webp 640w, /img/terrace-1024w.webp 1024w\"",
        ));

    assert!(temp_dir.path().join("terrace-640w.webp").exists());
    assert!(temp_dir.path().join("terrace-1024w.webp").exists());
    assert!(!temp_dir.path().join("terrace-1920w.webp").exists());
}

#[test]
fn test_in_place_mode_replaces_source() {
    use assert_fs::prelude::*;

    let temp = assert_fs::TempDir::new().unwrap();
    write_png(temp.child("garden.png").path(), 320, 240);
    write_small_tier_config(temp.path());

    cmd()
        .args(["optimize", &temp.path().to_string_lossy(), "--mode", "in-place"])
        .assert()
        .success();

    temp.child("garden.png").assert(predicate::path::missing());
    temp.child("garden.webp").assert(predicate::path::is_file());
    temp.child("garden-optimized.webp")
        .assert(predicate::path::missing());

    temp.close().unwrap();
}
