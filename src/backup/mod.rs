//! Database snapshots: create, list, restore, upload, delete.
//!
//! Snapshots live as flat siblings in the backup directory:
//! `targets_<stamp>.db`, `pre_restore_<stamp>.db` and
//! `uploaded_<stamp>_<name>.db`. They are written once and never modified.
//!
//! Every file that lands in the backup directory or replaces the live
//! database is first staged under a hidden temporary name in the
//! destination directory and fsynced. Copies are checked against the source
//! digest. The live database is then replaced by rename ([`replace_file`]).
//! New snapshots are published by hard link under a name that must not
//! exist yet, so two writers can never claim the same file.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::BackupConfig;
use crate::db::{count_targets_in, Db};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DB_EXTENSION: &str = "db";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid backup filename: {0:?}")]
    InvalidName(String),

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("{name} is not a usable targets database: {reason}")]
    InvalidDatabase { name: String, reason: String },

    #[error("restore failed: {0}")]
    RestoreFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A file in the backup directory.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub filename: String,
    pub created: DateTime<Local>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub success: bool,
    pub message: String,
    /// Safety snapshot of the database as it was before the restore.
    /// `None` when there was no live database to protect.
    pub pre_restore_backup: Option<String>,
    pub targets_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotKind {
    Manual,
    PreRestore,
}

impl SnapshotKind {
    fn prefix(&self) -> &'static str {
        match self {
            SnapshotKind::Manual => "targets",
            SnapshotKind::PreRestore => "pre_restore",
        }
    }
}

pub struct BackupManager {
    config: BackupConfig,
}

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.config.dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    fn ensure_backup_dir(&self) -> Result<()> {
        if !self.config.dir.exists() {
            fs::create_dir_all(&self.config.dir).context("Failed to create backup directory")?;
        }
        Ok(())
    }

    /// Copy the live file into a new snapshot. Caller holds the exclusive gate.
    fn snapshot_live(&self, live: &Path, kind: SnapshotKind) -> Result<Snapshot> {
        self.ensure_backup_dir()?;
        let staging = stage_verified(live, &self.config.dir)
            .with_context(|| format!("Failed to snapshot {}", live.display()))?;
        let stamp = Local::now().format(STAMP_FORMAT);
        let path = publish_new(
            &staging,
            &self.config.dir,
            &format!("{}_{stamp}", kind.prefix()),
            DB_EXTENSION,
        )?;
        info!(snapshot = %path.display(), "created database snapshot");
        snapshot_info(&path)
    }

    pub fn create(&self, db: &Db) -> Result<Snapshot, SnapshotError> {
        let _gate = db.lock_exclusive();
        if !db.path().is_file() {
            return Err(SnapshotError::Other(anyhow::anyhow!(
                "database file {} does not exist",
                db.path().display()
            )));
        }
        Ok(self.snapshot_live(db.path(), SnapshotKind::Manual)?)
    }

    /// Snapshots, newest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        if !self.config.dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in WalkDir::new(&self.config.dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            // staging files
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            snapshots.push(snapshot_info(entry.path())?);
        }
        snapshots.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.filename.cmp(&a.filename)));
        Ok(snapshots)
    }

    /// Path of an existing snapshot, after rejecting anything that is not a
    /// plain file name.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, SnapshotError> {
        validate_name(filename)?;
        let path = self.config.dir.join(filename);
        if !path.is_file() {
            return Err(SnapshotError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    pub fn delete(&self, filename: &str) -> Result<(), SnapshotError> {
        let path = self.resolve(filename)?;
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete backup {}", path.display()))?;
        info!(snapshot = %filename, "deleted database snapshot");
        Ok(())
    }

    pub fn restore(&self, db: &Db, filename: &str) -> Result<RestoreOutcome, SnapshotError> {
        let source = self.resolve(filename)?;
        self.restore_from(db, &source)
    }

    /// Store uploaded bytes as a new snapshot and restore from it. An upload
    /// that is not a targets database is discarded again.
    pub fn upload(&self, db: &Db, original_name: &str, bytes: &[u8]) -> Result<RestoreOutcome, SnapshotError> {
        let saved = self.save_upload(original_name, bytes)?;
        let result = self.restore_from(db, &saved);
        if let Err(SnapshotError::InvalidDatabase { .. }) = &result {
            let _ = fs::remove_file(&saved);
        }
        result
    }

    fn save_upload(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf, SnapshotError> {
        let name = upload_base_name(original_name)?;
        self.ensure_backup_dir()?;

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = Path::new(&name)
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| DB_EXTENSION.to_string());
        let staging = stage_bytes(&self.config.dir, &name, bytes)
            .context("Failed to save upload")?;
        let stamp = Local::now().format(STAMP_FORMAT);
        let path = publish_new(
            &staging,
            &self.config.dir,
            &format!("uploaded_{stamp}_{stem}"),
            &extension,
        )?;
        info!(snapshot = %path.display(), size = bytes.len(), "saved uploaded backup");
        Ok(path)
    }

    fn restore_from(&self, db: &Db, source: &Path) -> Result<RestoreOutcome, SnapshotError> {
        self.restore_with(db, source, count_targets_in)
    }

    /// Replace the live database with `source`.
    ///
    /// The source is checked before anything is touched. The safety snapshot
    /// must succeed before the swap starts. `count_live` reads the swapped-in
    /// file; if the swap fails or the count differs from the source, the
    /// safety snapshot is swapped back in.
    fn restore_with<F>(&self, db: &Db, source: &Path, count_live: F) -> Result<RestoreOutcome, SnapshotError>
    where
        F: Fn(&Path) -> Result<i64>,
    {
        let source_name = file_name_of(source);
        let expected = count_targets_in(source).map_err(|e| SnapshotError::InvalidDatabase {
            name: source_name.clone(),
            reason: format!("{e:#}"),
        })?;

        let _gate = db.lock_exclusive();
        let live = db.path();

        let safety = if live.is_file() {
            Some(self.snapshot_live(live, SnapshotKind::PreRestore)?)
        } else {
            warn!(live = %live.display(), "no live database to protect before restore");
            None
        };

        let swapped = replace_file(source, live).and_then(|()| {
            let restored = count_live(live)?;
            if restored != expected {
                anyhow::bail!("restored database has {restored} targets, backup has {expected}");
            }
            Ok(restored)
        });

        match swapped {
            Ok(targets_count) => {
                info!(source = %source_name, targets_count, "database restored");
                Ok(RestoreOutcome {
                    success: true,
                    message: format!("Database restored from {source_name}"),
                    pre_restore_backup: safety.map(|s| s.filename),
                    targets_count,
                })
            }
            Err(err) => {
                error!(source = %source_name, "restore failed: {err:#}");
                let Some(safety) = safety else {
                    return Err(SnapshotError::RestoreFailed(format!("{err:#}")));
                };
                let safety_path = self.config.dir.join(&safety.filename);
                match replace_file(&safety_path, live) {
                    Ok(()) => {
                        warn!(snapshot = %safety.filename, "rolled back to pre-restore snapshot");
                        Err(SnapshotError::RestoreFailed(format!(
                            "{err:#}; rolled back to {}",
                            safety.filename
                        )))
                    }
                    Err(rollback_err) => {
                        error!(snapshot = %safety.filename, "rollback failed: {rollback_err:#}");
                        Err(SnapshotError::RestoreFailed(format!(
                            "{err:#}; rollback to {} also failed: {rollback_err:#}",
                            safety.filename
                        )))
                    }
                }
            }
        }
    }
}

/// Accept only a single, plain path component.
fn validate_name(name: &str) -> Result<(), SnapshotError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains("..")
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).components().count() != 1;
    if invalid {
        return Err(SnapshotError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Final path component of a client-supplied file name, which must carry
/// the database extension.
fn upload_base_name(original: &str) -> Result<String, SnapshotError> {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        return Err(SnapshotError::InvalidUpload("no file selected".to_string()));
    }
    let has_extension = Path::new(base)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DB_EXTENSION));
    if !has_extension {
        return Err(SnapshotError::InvalidUpload(format!(
            "{base}: only .{DB_EXTENSION} files are accepted"
        )));
    }
    validate_name(base).map_err(|_| SnapshotError::InvalidUpload(format!("{base}: invalid file name")))?;
    Ok(base.to_string())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn snapshot_info(path: &Path) -> Result<Snapshot> {
    let metadata = fs::metadata(path)?;
    let created = metadata.created().or_else(|_| metadata.modified())?;
    Ok(Snapshot {
        filename: file_name_of(path),
        created: DateTime::<Local>::from(created),
        size_bytes: metadata.len(),
    })
}

/// Hidden temporary name in `dir`. The counter keeps concurrent stagings
/// of the same name apart.
fn staging_path(dir: &Path, name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
}

fn file_digest(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

/// Make a completed rename or link durable.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Atomically replace (or create) `dest` with a verified copy of `src`.
pub fn replace_file(src: &Path, dest: &Path) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new(""));
    let staging = stage_verified(src, dir)?;
    if let Err(e) = fs::rename(&staging, dest) {
        let _ = fs::remove_file(&staging);
        return Err(e).with_context(|| format!("Failed to move staged copy over {}", dest.display()));
    }
    sync_parent(dest);
    Ok(())
}

/// Copy `src` to a staging file in `dir`, fsync it and check it against the
/// source digest. The caller owns the returned file.
fn stage_verified(src: &Path, dir: &Path) -> Result<PathBuf> {
    let expected = file_digest(src).with_context(|| format!("Failed to read {}", src.display()))?;
    let staging = staging_path(dir, &file_name_of(src));

    let result = (|| -> Result<()> {
        let mut input = File::open(src)?;
        let mut output = OpenOptions::new().write(true).create_new(true).open(&staging)?;
        io::copy(&mut input, &mut output)?;
        output.sync_all()?;
        if file_digest(&staging)? != expected {
            anyhow::bail!("staged copy of {} does not match its source", src.display());
        }
        Ok(())
    })();

    match result {
        Ok(()) => Ok(staging),
        Err(e) => {
            let _ = fs::remove_file(&staging);
            Err(e)
        }
    }
}

/// Write `bytes` to a fsynced staging file in `dir`.
fn stage_bytes(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let staging = staging_path(dir, name);
    let result = (|| -> Result<()> {
        let mut output = OpenOptions::new().write(true).create_new(true).open(&staging)?;
        output.write_all(bytes)?;
        output.sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => Ok(staging),
        Err(e) => {
            let _ = fs::remove_file(&staging);
            Err(e)
        }
    }
}

/// Give `staging` its final name `{stem}.{extension}` in `dir`, or
/// `{stem}_1.{extension}`, `{stem}_2.{extension}`, ... when that is taken.
///
/// The hard link fails if the name exists, so an existing file is never
/// overwritten and two publishers never end up with the same name. The
/// staging file is removed either way.
fn publish_new(staging: &Path, dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    let result = (|| -> Result<PathBuf> {
        let mut n = 0u32;
        loop {
            let candidate = if n == 0 {
                dir.join(format!("{stem}.{extension}"))
            } else {
                dir.join(format!("{stem}_{n}.{extension}"))
            };
            match fs::hard_link(staging, &candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to publish {}", candidate.display()))
                }
            }
        }
    })();

    let _ = fs::remove_file(staging);
    if let Ok(path) = &result {
        sync_parent(path);
    }
    result
}
