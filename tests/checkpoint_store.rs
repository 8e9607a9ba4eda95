use std::fs;
use std::path::Path;

use addr_harvest::domain::address::{Address, AddressSet};
use addr_harvest::domain::checkpoint::Checkpoint;
use addr_harvest::error::CheckpointError;
use addr_harvest::store::csv_store::{CsvCheckpointStore, read_csv};
use addr_harvest::store::repo::CheckpointRepository;

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn awkward_set() -> AddressSet {
    [
        Address::new("Doe, Jane", "jane@x.com"),
        Address::new("Say \"hi\"", "quote@x.com"),
        Address::new("", "bare@x.com"),
        Address::new("Line\nBreak", "nl@x.com"),
        Address::new("Jürgen Müller", "j@x.de"),
        Address::new(",\"\",", "commas@x.com"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn empty_directory_starts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();
    fs::write(dir.path().join("addresses_x.csv"), "unrelated").unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();
    assert_eq!(cp.consumed(), 0);
    assert!(cp.addresses().is_empty());
    assert_eq!(store.current(), None);
}

#[test]
fn persisted_addresses_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let original = awkward_set();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    store
        .persist(&Checkpoint::new(200, original.clone()))
        .unwrap();

    let mut reopened = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = reopened.discover_latest().unwrap();
    assert_eq!(cp.consumed(), 200);
    assert_eq!(cp.addresses(), &original);
    assert_eq!(cp.addresses().len(), 6);
}

#[test]
fn persist_replaces_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();

    let mut cp = Checkpoint::default();
    cp.advance(200, &[Address::new("", "a@x.com")].into_iter().collect::<AddressSet>());
    store.persist(&cp).unwrap();
    cp.advance(400, &[Address::new("", "b@x.com")].into_iter().collect::<AddressSet>());
    store.persist(&cp).unwrap();

    assert_eq!(listing(dir.path()), vec!["addresses_400.csv"]);
    assert_eq!(read_csv(&dir.path().join("addresses_400.csv")).unwrap().len(), 2);
}

#[test]
fn highest_count_wins_when_old_file_was_not_deleted() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_200.csv"),
        "Name,Email\r\n\"\",\"old@x.com\"\r\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("addresses_1000.csv"),
        "Name,Email\r\n\"\",\"old@x.com\"\r\n\"\",\"new@x.com\"\r\n",
    )
    .unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();
    // numeric, not lexical, ordering
    assert_eq!(cp.consumed(), 1000);
    assert_eq!(cp.addresses().len(), 2);

    // the next persist clears out both older files
    store.persist(&Checkpoint::new(1200, cp.addresses().clone())).unwrap();
    assert_eq!(listing(dir.path()), vec!["addresses_1200.csv"]);
}

#[test]
fn unreadable_newest_falls_back_to_older_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_200.csv"),
        "Name,Email\r\n\"A\",\"a@x.com\"\r\n",
    )
    .unwrap();
    // interrupted write: nothing but a partial header
    fs::write(dir.path().join("addresses_400.csv"), "Na").unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();
    assert_eq!(cp.consumed(), 200);
    assert_eq!(store.current(), Some(200));
    assert_eq!(
        listing(dir.path()),
        vec!["addresses_200.csv", "addresses_400.csv.corrupt"]
    );
}

fn checkpoint_with_unterminated_quote() -> String {
    let mut body = String::from("Name,Email\r\n\"O\"\"Brien\",\"ob@x.com\"\r\n\"Broken,x@x.com\r\n");
    for i in 0..50 {
        body.push_str(&format!("Plain{i},u{i}@x.com\r\n"));
    }
    body
}

#[test]
fn unterminated_quote_is_not_resumed_from() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("addresses_500.csv");
    let body = checkpoint_with_unterminated_quote();
    fs::write(&path, &body).unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    match store.discover_latest() {
        Err(CheckpointError::Corrupt { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected corrupt checkpoint, got {other:?}"),
    }
    // untouched, so nothing of the 51 rows is lost
    assert_eq!(fs::read_to_string(&path).unwrap(), body);
}

#[test]
fn unterminated_quote_falls_back_to_older_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_200.csv"),
        "Name,Email\r\n\"A\",\"a@x.com\"\r\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("addresses_500.csv"),
        checkpoint_with_unterminated_quote(),
    )
    .unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();
    assert_eq!(cp.consumed(), 200);
    assert_eq!(
        listing(dir.path()),
        vec!["addresses_200.csv", "addresses_500.csv.corrupt"]
    );
}

#[test]
fn lone_corrupt_checkpoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("addresses_400.csv");
    fs::write(&path, "not,a,checkpoint\r\n").unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    match store.discover_latest() {
        Err(CheckpointError::Corrupt { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected corrupt checkpoint, got {other:?}"),
    }
    // left in place for the operator
    assert!(path.exists());
}

#[test]
fn peek_reports_without_changing_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_200.csv"),
        "Name,Email\r\n\"A\",\"a@x.com\"\r\n",
    )
    .unwrap();
    fs::write(dir.path().join("addresses_400.csv"), "Na").unwrap();
    fs::write(dir.path().join("addresses_600.csv.tmp"), "Name,Em").unwrap();
    let before = listing(dir.path());

    let store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.peek_latest().unwrap().unwrap();
    assert_eq!(cp.consumed(), 200);
    assert_eq!(cp.addresses().len(), 1);
    assert_eq!(store.current(), None);
    assert_eq!(listing(dir.path()), before);
}

#[test]
fn peek_on_empty_directory_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvCheckpointStore::open(dir.path()).unwrap();
    assert!(store.peek_latest().unwrap().is_none());
}

#[test]
fn interrupted_writes_are_cleaned_up_on_discovery() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_200.csv"),
        "Name,Email\r\n\"A\",\"a@x.com\"\r\n",
    )
    .unwrap();
    fs::write(dir.path().join("addresses_400.csv.tmp"), "Name,Email\r\n\"B\",").unwrap();
    fs::write(dir.path().join("addresses_9000.csv.tmp"), "").unwrap();
    fs::write(dir.path().join("notes.tmp"), "unrelated").unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    assert_eq!(store.discover_latest().unwrap().consumed(), 200);
    assert_eq!(listing(dir.path()), vec!["addresses_200.csv", "notes.tmp"]);
}

#[test]
fn persist_leaves_no_temporary_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    store.discover_latest().unwrap();

    store.persist(&Checkpoint::new(200, awkward_set())).unwrap();
    store.persist(&Checkpoint::new(400, awkward_set())).unwrap();
    assert_eq!(listing(dir.path()), vec!["addresses_400.csv"]);
}

#[test]
fn orphaned_backup_blocks_resume() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("addresses_600.csv.bak"),
        "Name,Email\r\n\"A\",\"a@x.com\"\r\n",
    )
    .unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    match store.discover_latest() {
        Err(CheckpointError::OrphanedBackup { backup, restore_to }) => {
            assert!(backup.ends_with("addresses_600.csv.bak"));
            assert!(restore_to.ends_with("addresses_600.csv"));
        }
        other => panic!("expected orphaned backup, got {other:?}"),
    }

    // after the manual rename everything is back
    fs::rename(
        dir.path().join("addresses_600.csv.bak"),
        dir.path().join("addresses_600.csv"),
    )
    .unwrap();
    let cp = store.discover_latest().unwrap();
    assert_eq!(cp.consumed(), 600);
}

#[test]
fn backup_next_to_its_checkpoint_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let body = "Name,Email\r\n\"A\",\"a@x.com\"\r\n";
    fs::write(dir.path().join("addresses_600.csv"), body).unwrap();
    fs::write(dir.path().join("addresses_600.csv.bak"), body).unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    assert_eq!(store.discover_latest().unwrap().consumed(), 600);
}

#[test]
fn compaction_normalizes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("addresses_300.csv");
    fs::write(
        &path,
        "Name,Email\nZed,z@x.com\n\"Amy\",\"a@x.com\"\nbroken row\nzed,Z@X.COM\n",
    )
    .unwrap();

    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();
    assert_eq!(cp.addresses().len(), 2);

    let out = store.compact(&cp).unwrap();
    assert_eq!(out, path);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "Name,Email\r\n\"Amy\",\"a@x.com\"\r\n\"Zed\",\"z@x.com\"\r\n"
    );
    assert_eq!(listing(dir.path()), vec!["addresses_300.csv"]);
}

#[test]
fn compaction_without_a_file_writes_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = CsvCheckpointStore::open(dir.path()).unwrap();
    let cp = store.discover_latest().unwrap();

    let out = store.compact(&cp).unwrap();
    assert!(out.ends_with("addresses_0.csv"));
    assert_eq!(fs::read_to_string(out).unwrap(), "Name,Email\r\n");
}
