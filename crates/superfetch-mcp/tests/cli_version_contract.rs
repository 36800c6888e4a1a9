#[test]
fn superfetch_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("superfetch");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .output()
        .expect("run superfetch version");

    assert!(out.status.success(), "superfetch version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["name"].as_str(), Some("superfetch"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}
