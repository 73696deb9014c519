// Runs the compiled binary in replay mode; no terminal is needed.

use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn replay_prints_disqualified_outcome() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("script.json");
    std::fs::write(
        &script,
        r#"{
            "modality": "mcq",
            "steps": [
                {"step": "begin"},
                {"step": "act", "action": {"modality": "mcq", "action": {"op": "select", "arg": 0}}},
                {"step": "focus", "focused": false},
                {"step": "focus", "focused": true},
                {"step": "focus", "focused": false},
                {"step": "focus", "focused": true},
                {"step": "face", "present": false},
                {"step": "tick", "millis": 1000},
                {"step": "focus", "focused": false},
                {"step": "intercept", "interaction": "copy"}
            ]
        }"#,
    )?;

    let output = Command::cargo_bin("proctor")?
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .arg("--replay")
        .arg(&script)
        .output()?;

    assert!(output.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(outcome["status"], "disqualified");
    assert_eq!(outcome["result"]["violation_count"], 5);
    assert_eq!(outcome["result"]["answers"]["modality"], "mcq");
    Ok(())
}

#[test]
fn replay_with_missing_script_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    Command::cargo_bin("proctor")?
        .env("HOME", dir.path())
        .arg("--replay")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure();
    Ok(())
}

#[test]
fn history_on_empty_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let output = Command::cargo_bin("proctor")?
        .env("HOME", dir.path())
        .arg("--history")
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains("no stored results"));
    Ok(())
}
