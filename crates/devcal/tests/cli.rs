use assert_cmd::Command;
use predicates::prelude::*;

fn devcal() -> Command {
    Command::cargo_bin("devcal").expect("devcal binary")
}

#[test]
fn missing_square_size_is_a_usage_error() {
    devcal()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("<SQUARE_SIZE>"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    devcal().args(["-x", "0.025"]).assert().code(2);
}

#[test]
fn non_numeric_square_size_exits_with_3() {
    devcal()
        .arg("abc")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid square size"));
}

#[test]
fn negative_square_size_exits_with_3() {
    devcal().args(["--", "-1"]).assert().code(3);
}

#[test]
fn zero_sampled_frames_exits_with_2() {
    devcal()
        .args(["--frames", "0", "0.025"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least one frame"));
}

#[test]
fn long_help_is_available() {
    devcal()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("-h"))
        .stdout(predicate::str::contains("--data-dir"));
}

#[test]
fn empty_data_root_exits_with_0() {
    let root = tempfile::tempdir().expect("tempdir");
    devcal()
        .arg("--data-dir")
        .arg(root.path())
        .arg("--output-dir")
        .arg(root.path().join("out"))
        .arg("0.025")
        .assert()
        .success();
}

#[test]
fn device_without_sources_exits_with_1() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(root.path().join("cam0")).expect("mkdir");
    std::fs::write(root.path().join("cam0").join("notes.txt"), "x").expect("write");
    devcal()
        .arg("--data-dir")
        .arg(root.path())
        .arg("--output-dir")
        .arg(root.path().join("out"))
        .args(["0.025", "cam0"])
        .assert()
        .code(1);
    assert!(!root.path().join("out").join("cam0.json").exists());
}
