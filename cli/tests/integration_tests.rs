use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SAMPLE: &str = "\
FILE_TYPE=MULTI_PHYS_TABLE;
PART 'PINS'
:PIN=IO_STD|DRIVE;
'A1'='LVCMOS18'|'12'
'A2'='LVDS'|''
END_PART
END.
";

fn ptf_manager(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ptf-manager"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run ptf-manager")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ---------------------------------------------------------------------------
// import / export
// ---------------------------------------------------------------------------

#[test]
fn import_then_export_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("in")).unwrap();
    fs::write(dir.path().join("in/pins.ptf"), SAMPLE).unwrap();

    let output = ptf_manager(dir.path(), &["import", "-d", "in"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Imported PTF file '"));
    assert!(stdout(&output).contains("pins.ptf' ("));
    assert!(dir.path().join("part_table.db").is_file());

    let output = ptf_manager(dir.path(), &["export"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let exported = fs::read_to_string(dir.path().join("part_table.ptf")).unwrap();
    assert_eq!(
        exported,
        "FILE_TYPE=MULTI_PHYS_TABLE;\n\nPART 'PINS'\n:PIN=IO_STD|DRIVE;\n'A1'='LVCMOS18'|'12'\n'A2'='LVDS'|''\nEND_PART\n\nEND.\n"
    );
}

#[test]
fn explicit_paths_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pins.ptf"), SAMPLE).unwrap();

    let output = ptf_manager(dir.path(), &["import", "--db-file", "custom.db", "--ptf-dir", "."]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("custom.db").is_file());
    assert!(!dir.path().join("part_table.db").exists());

    let output = ptf_manager(dir.path(), &["export", "-f", "custom.db", "-p", "out.ptf"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("out.ptf").is_file());
}

#[test]
fn recursive_import_visits_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("tables/nested")).unwrap();
    fs::write(dir.path().join("tables/top.ptf"), SAMPLE).unwrap();
    fs::write(
        dir.path().join("tables/nested/banks.ptf"),
        "FILE_TYPE=MULTI_PHYS_TABLE;\nPART 'BANKS'\n:BANK=VCCO;\n'0'='1.8'\nEND_PART\nEND.\n",
    )
    .unwrap();
    fs::write(dir.path().join("tables/notes.txt"), "not a table").unwrap();

    let flat = ptf_manager(dir.path(), &["import", "-d", "tables", "-f", "flat.db"]);
    assert!(flat.status.success());
    assert_eq!(stdout(&flat).matches("Imported PTF file").count(), 1);

    let deep = ptf_manager(dir.path(), &["import", "-d", "tables", "-f", "deep.db", "-r"]);
    assert!(deep.status.success(), "stderr: {}", stderr(&deep));
    assert_eq!(stdout(&deep).matches("Imported PTF file").count(), 2);

    let status = ptf_manager(dir.path(), &["status", "-f", "deep.db"]);
    assert!(status.status.success());
    let text = stdout(&status);
    assert!(text.contains("BANKS: 1 rows"));
    assert!(text.contains("PINS: 2 rows"));
    assert!(text.contains("Total rows: 3"));
}

#[cfg(unix)]
#[test]
fn recursive_import_skips_symlinked_directories() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("tables/nested")).unwrap();
    fs::write(dir.path().join("tables/nested/pins.ptf"), SAMPLE).unwrap();
    std::os::unix::fs::symlink(
        dir.path().join("tables"),
        dir.path().join("tables/nested/loop"),
    )
    .unwrap();

    let output = ptf_manager(dir.path(), &["import", "-d", "tables", "-r"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).matches("Imported PTF file").count(), 1);
}

#[test]
fn files_are_imported_in_path_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b.ptf"),
        "FILE_TYPE=MULTI_PHYS_TABLE;\nPART 'T'\n:K=V|W;\n'2'='y'|'z'\nEND_PART\nEND.\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("a.ptf"),
        "FILE_TYPE=MULTI_PHYS_TABLE;\nPART 'T'\n:K=V;\n'1'='x'\nEND_PART\nEND.\n",
    )
    .unwrap();

    let output = ptf_manager(dir.path(), &["import"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    let a = text.find("a.ptf").unwrap();
    let b = text.find("b.ptf").unwrap();
    assert!(a < b);
    assert!(text.contains("Tables created: 1"));
    assert!(text.contains("Tables migrated: 1"));
}

// ---------------------------------------------------------------------------
// failures
// ---------------------------------------------------------------------------

#[test]
fn unsupported_file_type_fails_but_continues() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a_bad.ptf"), "FILE_TYPE=FOO;\nEND.\n").unwrap();
    fs::write(dir.path().join("b_good.ptf"), SAMPLE).unwrap();

    let output = ptf_manager(dir.path(), &["import"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("a_bad.ptf"));
    assert!(stderr(&output).contains("FOO"));
    assert!(stdout(&output).contains("b_good.ptf"));

    let status = ptf_manager(dir.path(), &["status"]);
    assert!(stdout(&status).contains("PINS: 2 rows"));
}

#[test]
fn export_without_database_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptf_manager(dir.path(), &["export", "-f", "missing.db"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
    assert!(!dir.path().join("missing.db").exists());
    assert!(!dir.path().join("part_table.ptf").exists());
}

#[test]
fn missing_ptf_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptf_manager(dir.path(), &["import", "-d", "nowhere"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("nowhere"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_file_supplies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/pins.tbl"), SAMPLE).unwrap();
    fs::write(
        dir.path().join("ptf.yaml"),
        "db_file: from_config.db\nptf_dir: src\nextension: tbl\nptf_file: from_config.ptf\n",
    )
    .unwrap();

    let output = ptf_manager(dir.path(), &["--config", "ptf.yaml", "import"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("pins.tbl"));
    assert!(dir.path().join("from_config.db").is_file());

    let output = ptf_manager(dir.path(), &["export", "--config", "ptf.yaml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("from_config.ptf").is_file());
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.yaml"), "recursive: [not, a, bool]\n").unwrap();
    let output = ptf_manager(dir.path(), &["--config", "bad.yaml", "status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load config"));
}
