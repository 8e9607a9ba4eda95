//! Checkpoints as `addresses_<count>.csv` files in one directory.
//!
//! Every write goes to `<name>.tmp`, is synced, then renamed into place (and
//! the directory synced), and only after that is the previous checkpoint
//! removed. Stray `.tmp` files from an interrupted write are deleted on the
//! next discovery. A crash can therefore
//! leave two valid checkpoints (the higher one wins) but never a lone partial
//! one. Compaction moves the file to `<name>.bak` while it rewrites it; if
//! that is interrupted the backup must be renamed back by hand.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::address::{Address, AddressSet};
use crate::domain::checkpoint::Checkpoint;
use crate::error::CheckpointError;
use crate::store::repo::CheckpointRepository;

pub const FILE_PREFIX: &str = "addresses_";
const EXTENSION: &str = ".csv";
const BACKUP_SUFFIX: &str = ".bak";
const TMP_SUFFIX: &str = ".tmp";
const CORRUPT_SUFFIX: &str = ".corrupt";
const HEADER: [&str; 2] = ["Name", "Email"];

pub struct CsvCheckpointStore {
    dir: PathBuf,
    current: Option<u32>,
    // older checkpoints left behind by an interrupted persist
    stale: Vec<u32>,
}

#[derive(Default)]
struct Listing {
    // both newest first
    checkpoints: Vec<u32>,
    backups: Vec<u32>,
    temps: Vec<PathBuf>,
}

struct Survey {
    found: Option<Checkpoint>,
    older: Vec<u32>,
    // newer than `found`, unreadable
    corrupt: Vec<(PathBuf, String)>,
    temps: Vec<PathBuf>,
}

impl CsvCheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        Ok(Self {
            dir,
            current: None,
            stale: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Count of the checkpoint file this store currently considers live.
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn path_for(&self, count: u32) -> PathBuf {
        self.dir.join(file_name(count))
    }

    fn backup_path(&self, count: u32) -> PathBuf {
        self.dir.join(format!("{}{BACKUP_SUFFIX}", file_name(count)))
    }

    fn scan_dir(&self) -> Result<Listing, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;
        let mut listing = Listing::default();

        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(count) = parse_file_name(name) {
                listing.checkpoints.push(count);
            } else if let Some(count) = name
                .strip_suffix(BACKUP_SUFFIX)
                .and_then(parse_file_name)
            {
                listing.backups.push(count);
            } else if name
                .strip_suffix(TMP_SUFFIX)
                .and_then(parse_file_name)
                .is_some()
            {
                listing.temps.push(entry.path());
            }
        }

        listing.checkpoints.sort_unstable_by(|a, b| b.cmp(a));
        listing.backups.sort_unstable_by(|a, b| b.cmp(a));
        Ok(listing)
    }

    /// Finds the newest readable checkpoint without touching the directory.
    fn survey(&self) -> Result<Survey, CheckpointError> {
        let listing = self.scan_dir()?;

        let mut survey = Survey {
            found: None,
            older: Vec::new(),
            corrupt: Vec::new(),
            temps: listing.temps,
        };
        for (i, &count) in listing.checkpoints.iter().enumerate() {
            let path = self.path_for(count);
            match read_csv(&path) {
                Ok(addresses) => {
                    survey.found = Some(Checkpoint::new(count, addresses));
                    survey.older = listing.checkpoints[i + 1..].to_vec();
                    break;
                }
                Err(CheckpointError::Corrupt { path, reason }) => {
                    log::warn!("skipping unreadable checkpoint {}: {reason}", path.display());
                    survey.corrupt.push((path, reason));
                }
                Err(e) => return Err(e),
            }
        }

        let found_count = survey.found.as_ref().map(Checkpoint::consumed);
        if let Some(&newest_backup) = listing.backups.first() {
            if found_count.is_none_or(|c| newest_backup > c) {
                return Err(CheckpointError::OrphanedBackup {
                    backup: self.backup_path(newest_backup),
                    restore_to: self.path_for(newest_backup),
                });
            }
            for &b in &listing.backups {
                log::warn!(
                    "leftover compaction backup {} can be deleted",
                    self.backup_path(b).display()
                );
            }
        }

        if survey.found.is_none() && !survey.corrupt.is_empty() {
            let (path, reason) = survey.corrupt.swap_remove(0);
            return Err(CheckpointError::Corrupt { path, reason });
        }
        Ok(survey)
    }

    /// Read-only counterpart of [`CheckpointRepository::discover_latest`]:
    /// same choice and same errors, but nothing is renamed or deleted.
    pub fn peek_latest(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.survey()?.found)
    }

    fn write_file(&self, count: u32, addresses: &AddressSet) -> Result<PathBuf, CheckpointError> {
        let path = self.path_for(count);
        let tmp = self.dir.join(format!("{}{TMP_SUFFIX}", file_name(count)));

        write_csv(&tmp, addresses)?;
        fs::rename(&tmp, &path).map_err(|e| CheckpointError::io(&path, e))?;
        // the rename must be on disk before any older checkpoint is unlinked
        sync_dir(&self.dir)?;
        Ok(path)
    }

    /// Deletes every known checkpoint other than `keep`.
    fn retire_others(&mut self, keep: u32) -> Result<(), CheckpointError> {
        let old: Vec<u32> = self.current.into_iter().chain(self.stale.drain(..)).collect();
        for count in old.into_iter().filter(|&c| c != keep) {
            let path = self.path_for(count);
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("removed superseded {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::io(&path, e)),
            }
        }
        self.current = Some(keep);
        Ok(())
    }
}

impl CheckpointRepository for CsvCheckpointStore {
    fn discover_latest(&mut self) -> Result<Checkpoint, CheckpointError> {
        let survey = self.survey()?;

        // a .tmp is never the only copy of anything; the rename did not happen
        for tmp in &survey.temps {
            match fs::remove_file(tmp) {
                Ok(()) => log::warn!("removed interrupted write {}", tmp.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::io(tmp, e)),
            }
        }

        let Some(checkpoint) = survey.found else {
            log::info!("no checkpoint in {}; starting from scratch", self.dir.display());
            self.current = None;
            self.stale.clear();
            return Ok(Checkpoint::default());
        };

        // Something older was readable, so the newer ones are interrupted writes.
        for (path, _) in survey.corrupt {
            let mut aside = path.clone().into_os_string();
            aside.push(CORRUPT_SUFFIX);
            fs::rename(&path, &aside).map_err(|e| CheckpointError::io(&path, e))?;
            log::warn!("moved {} aside to {}", path.display(), PathBuf::from(&aside).display());
        }

        log::info!(
            "resuming from {} ({} messages, {} addresses)",
            self.path_for(checkpoint.consumed()).display(),
            checkpoint.consumed(),
            checkpoint.addresses().len()
        );
        self.current = Some(checkpoint.consumed());
        self.stale = survey.older;
        Ok(checkpoint)
    }

    fn persist(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        let count = checkpoint.consumed();
        let path = self.write_file(count, checkpoint.addresses())?;
        self.retire_others(count)?;

        log::debug!(
            "persisted {} ({} addresses)",
            path.display(),
            checkpoint.addresses().len()
        );
        Ok(path)
    }

    fn compact(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        let count = checkpoint.consumed();
        let path = self.path_for(count);
        if !path.exists() {
            return self.persist(checkpoint);
        }

        let on_disk = read_csv(&path)?;
        let backup = self.backup_path(count);
        fs::rename(&path, &backup).map_err(|e| CheckpointError::io(&path, e))?;
        self.write_file(count, &on_disk)?;
        fs::remove_file(&backup).map_err(|e| CheckpointError::io(&backup, e))?;

        log::info!("compacted {} ({} addresses)", path.display(), on_disk.len());
        self.retire_others(count)?;
        Ok(path)
    }
}

fn file_name(count: u32) -> String {
    format!("{FILE_PREFIX}{count}{EXTENSION}")
}

fn parse_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), CheckpointError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| CheckpointError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), CheckpointError> {
    Ok(())
}

fn write_csv(path: &Path, addresses: &AddressSet) -> Result<(), CheckpointError> {
    let io_err = |e| CheckpointError::io(path, e);
    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    // Header is written bare; rows are always quoted.
    out.write_all(b"Name,Email\r\n").map_err(io_err)?;
    let mut w = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);
    for a in addresses.iter() {
        w.write_record([a.display_name(), a.address()])
            .map_err(|e| CheckpointError::io(path, e.into()))?;
    }

    let out = w
        .into_inner()
        .map_err(|e| CheckpointError::io(path, e.into_error()))?;
    let file = out.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}

/// Reads a checkpoint body.
///
/// A row on a single line without exactly two fields is skipped. A missing
/// header, undecodable content or broken quoting makes the whole file
/// corrupt: an unterminated quote swallows every following row into one
/// field, and skipping that would lose them silently.
pub fn read_csv(path: &Path) -> Result<AddressSet, CheckpointError> {
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| CheckpointError::io(path, e))?;
    if bytes.iter().filter(|&&b| b == b'"').count() % 2 != 0 {
        return Err(corrupt("unbalanced quotes".to_string()));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let header = rdr.headers().map_err(|e| corrupt(e.to_string()))?;
    if header.iter().ne(HEADER) {
        return Err(corrupt(format!("expected header `Name,Email`, got {header:?}")));
    }

    let mut set = AddressSet::new();
    for row in rdr.records() {
        let row = row.map_err(|e| corrupt(e.to_string()))?;
        let line = row.position().map_or(0, |p| p.line());
        match (row.get(0), row.get(1), row.len()) {
            (Some(name), Some(email), 2) if !has_line_break(email) => {
                set.add(Address::new(name, email));
            }
            _ if row.iter().any(has_line_break) => {
                return Err(corrupt(format!("row at line {line} runs over several lines")));
            }
            _ => log::warn!("{}: skipping malformed row at line {line}", path.display()),
        }
    }
    Ok(set)
}

fn has_line_break(field: &str) -> bool {
    field.contains(['\r', '\n'])
}
