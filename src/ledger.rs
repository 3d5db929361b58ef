//! Per-repository metadata and commit ledger.
//!
//! Layout of a repository directory:
//!
//! ```text
//! <repos>/<id>/meta.json      repository metadata, including `last_commit`
//! <repos>/<id>/commits.json   ordered commit records
//! <repos>/<id>/versions/      one archive per commit
//! ```
//!
//! Every mutation rewrites the affected document in full and recomputes
//! `last_commit` from the ledger, so the two never disagree.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::archive::ArchiveCodec;
use crate::error::AppError;
use crate::models::commit::CommitRecord;
use crate::models::repo::{RepoMeta, RepoStats};
use crate::persistence::json_store::{load_json, save_json};
use crate::snapshot::{next_archive_name, BuiltSnapshot};

const META_FILE: &str = "meta.json";
const COMMITS_FILE: &str = "commits.json";
const VERSIONS_DIR: &str = "versions";

/// Repository names are limited to ASCII letters, digits, `-` and `_`.
pub fn validate_repo_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::InvalidName("name is required".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::InvalidName(format!(
            "'{}' may only contain letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

/// Every repository under `repos_dir` that has a metadata document, sorted by id.
pub fn list_repos(repos_dir: &Path) -> Result<Vec<RepoMeta>, AppError> {
    if !repos_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut repos = Vec::new();
    for entry in std::fs::read_dir(repos_dir)? {
        let entry = entry?;
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let meta_path = entry.path().join(META_FILE);
        if !meta_path.is_file() {
            continue;
        }
        match load_json::<RepoMeta>(&meta_path) {
            Ok(Some(meta)) => repos.push(meta.normalize(&dir_name)),
            _ => {
                tracing::warn!(repo_id = %dir_name, "Repository metadata unreadable");
                let mut placeholder = RepoMeta::new(&dir_name, String::new());
                placeholder.description = "metadata unreadable".into();
                repos.push(placeholder);
            }
        }
    }
    repos.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(repos)
}

fn newest(commits: &[CommitRecord]) -> Option<CommitRecord> {
    commits
        .iter()
        .max_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)))
        .cloned()
}

fn oldest(commits: &[CommitRecord]) -> Option<CommitRecord> {
    commits
        .iter()
        .min_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)))
        .cloned()
}

#[derive(Debug, Clone)]
pub struct Ledger {
    id: String,
    dir: PathBuf,
    extension: &'static str,
}

impl Ledger {
    /// Open an existing repository.
    pub fn open(repos_dir: &Path, id: &str, extension: &'static str) -> Result<Self, AppError> {
        validate_repo_name(id)?;
        let dir = repos_dir.join(id);
        if !dir.is_dir() {
            return Err(AppError::RepoNotFound(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            dir,
            extension,
        })
    }

    /// Create a new, empty repository.
    pub fn create(
        repos_dir: &Path,
        id: &str,
        description: String,
        extension: &'static str,
    ) -> Result<(Self, RepoMeta), AppError> {
        validate_repo_name(id)?;
        let dir = repos_dir.join(id);
        if dir.exists() {
            return Err(AppError::RepoAlreadyExists(id.to_string()));
        }
        std::fs::create_dir_all(dir.join(VERSIONS_DIR))?;

        let ledger = Self {
            id: id.to_string(),
            dir,
            extension,
        };
        let meta = RepoMeta::new(id, description);
        save_json(&ledger.meta_path(), &meta)?;
        save_json(&ledger.commits_path(), &Vec::<CommitRecord>::new())?;
        Ok((ledger, meta))
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.dir.join(VERSIONS_DIR)
    }

    pub fn archive_path(&self, file: &str) -> PathBuf {
        self.versions_dir().join(file)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    fn commits_path(&self) -> PathBuf {
        self.dir.join(COMMITS_FILE)
    }

    pub fn meta(&self) -> Result<RepoMeta, AppError> {
        let meta = load_json::<RepoMeta>(&self.meta_path())?
            .unwrap_or_else(|| RepoMeta::new(&self.id, String::new()));
        Ok(meta.normalize(&self.id))
    }

    fn save_meta(&self, meta: &RepoMeta) -> Result<(), AppError> {
        save_json(&self.meta_path(), meta)
    }

    /// Commit records in ledger order.
    pub fn commits(&self) -> Result<Vec<CommitRecord>, AppError> {
        Ok(load_json::<Vec<CommitRecord>>(&self.commits_path())?.unwrap_or_default())
    }

    /// Commit records, newest first.
    pub fn list(&self) -> Result<Vec<CommitRecord>, AppError> {
        let mut commits = self.commits()?;
        commits.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.file.cmp(&a.file)));
        Ok(commits)
    }

    /// Archive filenames present in `versions/`, in lexicographic (= commit) order.
    pub fn archive_names(&self) -> Result<Vec<String>, AppError> {
        list_archives(&self.versions_dir(), self.extension)
    }

    /// Resolve a commit reference to an archive filename: exact name, then
    /// name plus extension, then a unique prefix.
    pub fn resolve(&self, commit_ref: &str) -> Result<String, AppError> {
        resolve_in(&self.archive_names()?, commit_ref, self.extension)
    }

    /// Like [`Ledger::resolve`], but `None` or `"latest"` pick the newest archive.
    pub fn resolve_or_latest(&self, commit_ref: Option<&str>) -> Result<String, AppError> {
        match commit_ref {
            None | Some("") | Some("latest") => self
                .archive_names()?
                .pop()
                .ok_or_else(|| AppError::CommitNotFound(format!("repository '{}' has no snapshots", self.id))),
            Some(r) => self.resolve(r),
        }
    }

    pub fn find(&self, file: &str) -> Result<Option<CommitRecord>, AppError> {
        Ok(self.commits()?.into_iter().find(|c| c.file == file))
    }

    /// Append a record and refresh the `last_commit` pointer.
    pub fn append(&self, record: CommitRecord) -> Result<CommitRecord, AppError> {
        let mut commits = self.commits()?;
        commits.push(record.clone());
        save_json(&self.commits_path(), &commits)?;
        self.refresh_meta(&commits)?;
        tracing::info!(repo_id = %self.id, file = %record.file, "Commit recorded");
        Ok(record)
    }

    /// Ledger entry for an archive the snapshot builder just wrote.
    pub fn record_snapshot(&self, built: &BuiltSnapshot, message: &str) -> Result<CommitRecord, AppError> {
        let record = self.new_record(&built.archive_name, message, built.size, built.file_count);
        self.append(record)
    }

    /// Move an archive produced elsewhere (an upload) into `versions/`
    /// under a fresh timestamp name and record it.
    pub fn register_archive(
        &self,
        codec: &dyn ArchiveCodec,
        source: &Path,
        message: &str,
    ) -> Result<CommitRecord, AppError> {
        // Refuse before moving anything if the ledger cannot be read.
        self.commits()?;
        let versions = self.versions_dir();
        std::fs::create_dir_all(&versions)?;
        let name = next_archive_name(&versions, self.extension)?;
        let dest = versions.join(&name);
        if std::fs::rename(source, &dest).is_err() {
            std::fs::copy(source, &dest)?;
            let _ = std::fs::remove_file(source);
        }

        let size = std::fs::metadata(&dest)?.len();
        let file_count = match codec.read_all(&dest) {
            Ok(entries) => entries.iter().filter(|e| !e.is_dir).count() as u64,
            Err(e) => {
                tracing::warn!(repo_id = %self.id, file = %name, error = %e, "Cannot count archive entries");
                0
            }
        };
        let record = self.new_record(&name, message, size, file_count);
        self.append(record)
    }

    fn new_record(&self, file: &str, message: &str, size: u64, file_count: u64) -> CommitRecord {
        let suffix = format!(".{}", self.extension);
        CommitRecord {
            id: file.strip_suffix(&suffix).unwrap_or(file).to_string(),
            file: file.to_string(),
            message: message.to_string(),
            size,
            date: Utc::now(),
            file_count,
        }
    }

    /// Delete a commit: the ledger is read first, then the archive goes, then
    /// the ledger entry and the pointer are rewritten.
    pub fn remove(&self, commit_ref: &str) -> Result<String, AppError> {
        let file = self.resolve(commit_ref)?;
        let commits: Vec<CommitRecord> = self
            .commits()?
            .into_iter()
            .filter(|c| c.file != file)
            .collect();

        let archive = self.archive_path(&file);
        if archive.exists() {
            std::fs::remove_file(&archive)?;
        }

        save_json(&self.commits_path(), &commits)?;
        self.refresh_meta(&commits)?;

        tracing::info!(repo_id = %self.id, file = %file, "Commit deleted");
        Ok(file)
    }

    fn refresh_meta(&self, commits: &[CommitRecord]) -> Result<(), AppError> {
        let mut meta = self.meta()?;
        meta.last_commit = newest(commits);
        meta.updated_at = Utc::now();
        self.save_meta(&meta)
    }

    pub fn update_description(&self, description: String) -> Result<RepoMeta, AppError> {
        let mut meta = self.meta()?;
        meta.description = description;
        meta.updated_at = Utc::now();
        self.save_meta(&meta)?;
        Ok(meta)
    }

    pub fn stats(&self) -> Result<RepoStats, AppError> {
        let commits = self.commits()?;
        let mut total_size = 0u64;
        for name in self.archive_names()? {
            if let Ok(meta) = std::fs::metadata(self.archive_path(&name)) {
                total_size += meta.len();
            }
        }
        let commit_count = commits.len();
        Ok(RepoStats {
            commit_count,
            total_size,
            average_size: if commit_count > 0 {
                total_size / commit_count as u64
            } else {
                0
            },
            first_commit: oldest(&commits),
            last_commit: newest(&commits),
        })
    }

    /// Remove the whole repository.
    pub fn delete(self) -> Result<(), AppError> {
        std::fs::remove_dir_all(&self.dir)?;
        tracing::info!(repo_id = %self.id, "Repository deleted");
        Ok(())
    }
}

/// Archive filenames in `versions_dir`, sorted.
pub fn list_archives(versions_dir: &Path, extension: &str) -> Result<Vec<String>, AppError> {
    if !versions_dir.is_dir() {
        return Ok(Vec::new());
    }
    let suffix = format!(".{}", extension);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(versions_dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(&suffix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Commit-ref resolution over a sorted list of archive names.
pub fn resolve_in(names: &[String], commit_ref: &str, extension: &str) -> Result<String, AppError> {
    if commit_ref.is_empty() {
        return Err(AppError::CommitNotFound("empty snapshot reference".into()));
    }
    if let Some(exact) = names.iter().find(|n| *n == commit_ref) {
        return Ok(exact.clone());
    }
    let with_ext = format!("{}.{}", commit_ref, extension);
    if let Some(found) = names.iter().find(|n| **n == with_ext) {
        return Ok(found.clone());
    }
    let matches: Vec<&String> = names.iter().filter(|n| n.starts_with(commit_ref)).collect();
    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(AppError::CommitNotFound(commit_ref.to_string())),
        many => Err(AppError::CommitNotFound(format!(
            "'{}' is ambiguous ({} snapshots match)",
            commit_ref,
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{EntryInput, TarGzCodec};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repo_names_are_restricted() {
        assert!(validate_repo_name("my-repo_2").is_ok());
        for bad in ["", "has space", "../up", "dot.name", "ünicode"] {
            assert!(matches!(validate_repo_name(bad), Err(AppError::InvalidName(_))), "{}", bad);
        }
    }

    #[test]
    fn resolution_order_is_exact_then_extension_then_prefix() {
        let list = names(&[
            "20250101_100000_000.tar.gz",
            "20250101_100000_001.tar.gz",
            "20250102_090000_000.tar.gz",
        ]);
        assert_eq!(resolve_in(&list, "20250102_090000_000.tar.gz", "tar.gz").unwrap(), list[2]);
        assert_eq!(resolve_in(&list, "20250101_100000_001", "tar.gz").unwrap(), list[1]);
        assert_eq!(resolve_in(&list, "20250102", "tar.gz").unwrap(), list[2]);
        assert!(matches!(resolve_in(&list, "20250101", "tar.gz"), Err(AppError::CommitNotFound(_))));
        assert!(matches!(resolve_in(&list, "1999", "tar.gz"), Err(AppError::CommitNotFound(_))));
    }

    #[test]
    fn create_twice_fails() {
        let tmp = tempfile::tempdir().unwrap();
        Ledger::create(tmp.path(), "demo", String::new(), "tar.gz").unwrap();
        assert!(matches!(
            Ledger::create(tmp.path(), "demo", String::new(), "tar.gz"),
            Err(AppError::RepoAlreadyExists(_))
        ));
        assert!(matches!(
            Ledger::open(tmp.path(), "other", "tar.gz"),
            Err(AppError::RepoNotFound(_))
        ));
    }

    #[test]
    fn remove_keeps_last_commit_pointer_in_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let codec = TarGzCodec::default();
        let (ledger, _) = Ledger::create(tmp.path(), "demo", "desc".into(), codec.extension()).unwrap();

        let mut files = Vec::new();
        for i in 0..3 {
            let staged = tmp.path().join(format!("upload-{}.tar.gz", i));
            codec
                .write(&staged, &[EntryInput::bytes("f.txt", format!("v{}", i).into_bytes())])
                .unwrap();
            files.push(ledger.register_archive(&codec, &staged, &format!("c{}", i)).unwrap().file);
        }
        assert_eq!(ledger.meta().unwrap().last_commit.unwrap().file, files[2]);

        ledger.remove(&files[2]).unwrap();
        assert!(!ledger.archive_path(&files[2]).exists());
        assert_eq!(ledger.meta().unwrap().last_commit.unwrap().file, files[1]);
        assert_eq!(ledger.commits().unwrap().len(), 2);

        ledger.remove(&files[0]).unwrap();
        ledger.remove(&files[1]).unwrap();
        assert!(ledger.meta().unwrap().last_commit.is_none());
        assert!(ledger.commits().unwrap().is_empty());
    }

    #[test]
    fn stats_and_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let codec = TarGzCodec::default();
        let (ledger, _) = Ledger::create(tmp.path(), "demo", String::new(), codec.extension()).unwrap();
        assert_eq!(ledger.stats().unwrap().commit_count, 0);
        assert_eq!(ledger.stats().unwrap().average_size, 0);

        for i in 0..2 {
            let staged = tmp.path().join(format!("u{}.tar.gz", i));
            codec.write(&staged, &[EntryInput::bytes("a", vec![b'x'; 10])]).unwrap();
            ledger.register_archive(&codec, &staged, "m").unwrap();
        }

        let stats = ledger.stats().unwrap();
        let listed = ledger.list().unwrap();
        assert_eq!(stats.commit_count, 2);
        assert_eq!(stats.first_commit.unwrap().file, listed[1].file);
        assert_eq!(stats.last_commit.unwrap().file, listed[0].file);
        assert_eq!(stats.total_size, listed.iter().map(|c| c.size).sum::<u64>());
        assert_eq!(listed[0].file_count, 1);
        assert!(listed[0].file > listed[1].file);
    }

    #[test]
    fn unreadable_ledger_is_never_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let codec = TarGzCodec::default();
        let (ledger, _) = Ledger::create(tmp.path(), "demo", String::new(), codec.extension()).unwrap();

        let mut files = Vec::new();
        for i in 0..3 {
            let staged = tmp.path().join(format!("u{}.tar.gz", i));
            codec.write(&staged, &[EntryInput::bytes("a", vec![b'x'; 4])]).unwrap();
            files.push(ledger.register_archive(&codec, &staged, "m").unwrap().file);
        }

        let commits_path = tmp.path().join("demo").join(COMMITS_FILE);
        let mut damaged = std::fs::read(&commits_path).unwrap();
        damaged.extend_from_slice(b"\n}garbage");
        std::fs::write(&commits_path, &damaged).unwrap();

        let staged = tmp.path().join("u3.tar.gz");
        codec.write(&staged, &[EntryInput::bytes("a", b"new".to_vec())]).unwrap();
        assert!(matches!(
            ledger.register_archive(&codec, &staged, "m"),
            Err(AppError::CorruptLedger(_))
        ));
        assert!(staged.exists());
        assert_eq!(ledger.archive_names().unwrap().len(), 3);

        assert!(matches!(ledger.remove(&files[0]), Err(AppError::CorruptLedger(_))));
        assert!(ledger.archive_path(&files[0]).exists());
        assert!(matches!(ledger.list(), Err(AppError::CorruptLedger(_))));
        assert_eq!(std::fs::read(&commits_path).unwrap(), damaged);
    }
}
