use cmdexec::mock::MultiCommandMock;
use cmdexec::{CancellationToken, CommandRunner, ExpectationSet};

const FIXTURE: &str = r#"{
    "commands": [
        { "name": "ls", "args": ["-l"], "stdout": "file1\nfile2\n" },
        { "name": "cat", "args": ["file1"], "stdout": "contents of file1", "stderr": "note" },
        { "name": "rm", "args": ["file2"], "error": "permission denied" },
        { "name": "ls", "args": ["-l"], "stdout": "shadowed" }
    ]
}"#;

fn write_fixture(label: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "cmdexec-fixture-{}-{}.json",
        label,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_fixture_from_path() {
    let path = write_fixture("valid", FIXTURE);
    let mock = MultiCommandMock::from_path(&path);
    std::fs::remove_file(&path).unwrap();
    let mock = mock.unwrap();

    assert_eq!(mock.expectations().len(), 4);

    let constructor = mock.constructor();
    let mut ls = constructor(CancellationToken::new(), "ls", &["-l"]);
    assert_eq!(ls.output().await.unwrap(), b"file1\nfile2\n");

    let mut cat = constructor(CancellationToken::new(), "cat", &["file1"]);
    assert_eq!(cat.combined_output().await.unwrap(), b"contents of file1note");

    let mut rm = constructor(CancellationToken::new(), "rm", &["file2"]);
    assert_eq!(rm.run().await.unwrap_err().to_string(), "permission denied");
}

#[test]
fn test_fixture_reports_duplicates() {
    let set = ExpectationSet::from_json(FIXTURE).unwrap();
    let duplicates = set.duplicate_patterns();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].to_string(), "ls -l");
}

#[test]
fn test_invalid_fixture_names_the_file() {
    let path = write_fixture("invalid", r#"{ "commands": [ { "name": "" } ] }"#);
    let result = MultiCommandMock::from_path(&path);
    std::fs::remove_file(&path).unwrap();

    let error = format!("{:#}", result.unwrap_err());
    assert!(error.contains("Invalid expectation set"));
    assert!(error.contains("commands[0]"));
}

#[test]
fn test_missing_fixture() {
    assert!(MultiCommandMock::from_path("/nonexistent/cmdexec/fixture.json").is_err());
}
