use predicates::prelude::PredicateBooleanExt;

#[test]
fn check_rdrive_help() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrive").unwrap();
    cmd.arg("--help").assert().success();
}

#[test]
fn check_rdrived_help() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrived").unwrap();
    cmd.arg("--help").assert().success();
}

#[test]
fn rdrive_requires_its_positional_args() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrive").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Usage"));
}

#[test]
fn rdrive_rejects_a_non_numeric_port() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrive").unwrap();
    cmd.args(["localhost", "not-a-port", "/tmp/folder"])
        .assert()
        .failure();
}

#[test]
fn rdrived_requires_a_port() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrived").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Usage").or(predicates::str::contains("required")));
}

#[test]
fn rdrived_rejects_a_non_numeric_port() {
    let mut cmd = assert_cmd::Command::cargo_bin("rdrived").unwrap();
    cmd.arg("nine").assert().failure();
}
