#[test]
fn superfetch_doctor_reports_valid_default_config() {
    let bin = assert_cmd::cargo::cargo_bin!("superfetch");
    let out = std::process::Command::new(bin)
        .args(["doctor"])
        .env_remove("ALLOW_REMOTE")
        .env_remove("AUTH_MODE")
        .env_remove("HOST")
        .output()
        .expect("run superfetch doctor");

    assert!(out.status.success(), "superfetch doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["host"].as_str(), Some("127.0.0.1"));
    assert_eq!(v["authMode"].as_str(), Some("static"));
}

#[test]
fn superfetch_doctor_rejects_remote_bind_without_oauth() {
    let bin = assert_cmd::cargo::cargo_bin!("superfetch");
    let out = std::process::Command::new(bin)
        .args(["doctor"])
        .env("ALLOW_REMOTE", "true")
        .env("HOST", "0.0.0.0")
        .env_remove("AUTH_MODE")
        .output()
        .expect("run superfetch doctor");

    assert!(!out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");
    assert_eq!(v["ok"].as_bool(), Some(false));
}
