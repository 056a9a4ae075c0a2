use std::process::Command;

use tempfile::tempdir;

fn pagesync() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pagesync"))
}

#[test]
fn help_lists_subcommands() {
    let output = pagesync().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["sync", "push", "pages"] {
        assert!(stdout.contains(command), "missing `{command}` in:\n{stdout}");
    }
}

#[test]
fn pages_lists_configured_entries() {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("projects/demo");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("sources.yaml"),
        "pages:\n  - name: Runbook\n    url: https://acme.example/wiki/spaces/OPS/pages/4242/Runbook\n    access: read-write\n",
    )
    .unwrap();

    let output = pagesync()
        .args(["--root"])
        .arg(dir.path())
        .args(["pages", "--project", "demo"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Runbook\t4242\tread-write\tpages/runbook.md"), "{stdout}");
}

#[test]
fn push_to_read_only_page_fails_before_credentials() {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("projects/demo");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("sources.yaml"),
        "pages:\n  - name: Overview\n    page_id: 1\n",
    )
    .unwrap();

    let output = pagesync()
        .arg("--root")
        .arg(dir.path())
        .args(["push", "--project", "demo", "--page", "Overview", "--stdin"])
        .env_remove("PAGESYNC_BASE_URL")
        .env_remove("PAGESYNC_EMAIL")
        .env_remove("PAGESYNC_API_TOKEN")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("read-only"), "{stderr}");
    assert!(!stderr.contains("PAGESYNC_API_TOKEN"), "{stderr}");
}

#[test]
fn unknown_project_reports_missing_sources() {
    let dir = tempdir().unwrap();

    let output = pagesync()
        .arg("--root")
        .arg(dir.path())
        .args(["sync", "--project", "ghost"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sources.yaml"));
}
