mod common;

use std::fs;
use std::process::Command;

use tempfile::tempdir;

use common::{MODEL_FILE, bias_only_artifact, table_a_with_heat_ceiling, write_deployment};

fn blackseed() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_blackseed"));
    command.env_remove("BLACKSEED_ROOT");
    command
}

#[test]
fn predict_prints_json_for_a_deployment() {
    let tmp = tempdir().expect("temporary directory");
    write_deployment(tmp.path(), &bias_only_artifact(25.0), table_a_with_heat_ceiling());

    let output = blackseed()
        .args(["--root", tmp.path().to_str().expect("path str")])
        .args([
            "predict",
            "--heat-hours",
            "800",
            "--may-spores",
            "20000",
            "--july-spores",
            "35000",
            "--management",
            "average",
            "--json",
        ])
        .output()
        .expect("run blackseed cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON prediction");
    let value = json["value"].as_f64().expect("numeric value");
    assert!((value - 27.5).abs() < 1e-9, "unexpected value {value}");
    assert_eq!(json["category"], "high");
    assert_eq!(json["basis"]["kind"], "model");
}

#[test]
fn predict_rejects_unknown_management_level() {
    let tmp = tempdir().expect("temporary directory");
    write_deployment(tmp.path(), &bias_only_artifact(25.0), table_a_with_heat_ceiling());

    let output = blackseed()
        .args(["--root", tmp.path().to_str().expect("path str")])
        .args([
            "predict",
            "--heat-hours",
            "800",
            "--may-spores",
            "1",
            "--july-spores",
            "1",
            "--management",
            "superb",
        ])
        .output()
        .expect("run blackseed cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown management level 'superb'"), "stderr: {stderr}");
}

#[test]
fn missing_configuration_is_fatal() {
    let tmp = tempdir().expect("temporary directory");
    let status = blackseed()
        .args(["--root", tmp.path().to_str().expect("path str"), "inspect"])
        .status()
        .expect("run blackseed cli");
    assert!(!status.success());
}

#[test]
fn batch_scores_every_row() {
    let tmp = tempdir().expect("temporary directory");
    write_deployment(tmp.path(), &bias_only_artifact(25.0), table_a_with_heat_ceiling());

    let input = tmp.path().join("stands.tsv");
    let output_path = tmp.path().join("out.tsv");
    fs::write(
        &input,
        "sample_id\theat_hours\tmay_peak_spores\tjuly_peak_spores\tmanagement\n\
north\t0\t0\t0\taverage\n\
south\t2000\t100\t100\tpoor\n\
east\t600\t100\t100\texcellent\n\
west\t600\tlots\t100\texcellent\n",
    )
    .expect("write input");

    let status = blackseed()
        .args(["--root", tmp.path().to_str().expect("path str"), "batch"])
        .arg(&input)
        .arg("--output")
        .arg(&output_path)
        .status()
        .expect("run blackseed cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let written = fs::read_to_string(&output_path).expect("read predictions");
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[1], "north\t0.000000\tnegligible\t#4CD964\t");
    assert_eq!(lines[2], "south\t50.000000\tmaximum\t#FF4C4C\t");
    assert_eq!(lines[3], "east\t22.500000\thigh\t#FFD93D\t");
    assert!(lines[4].starts_with("west\t\t\t\t"), "line: {}", lines[4]);
}

#[test]
fn template_deployment_is_usable() {
    let tmp = tempdir().expect("temporary directory");
    let root = tmp.path().join("starter");

    let status = blackseed()
        .args(["template", "--output", root.to_str().expect("path str")])
        .status()
        .expect("run blackseed cli");
    assert!(status.success(), "template exited with status {status:?}");
    assert!(root.join("blackseed.toml").is_file());
    assert!(root.join(MODEL_FILE).is_file());

    let output = blackseed()
        .args(["--root", root.to_str().expect("path str"), "inspect"])
        .output()
        .expect("run blackseed cli");
    assert!(output.status.success(), "inspect exited with {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Model: direct-linear"), "stdout: {stdout}");
    assert!(stdout.contains("Threshold table: table_a"), "stdout: {stdout}");
}
