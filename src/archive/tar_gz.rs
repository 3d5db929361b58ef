use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{entry_path, mtime_secs, ArchiveCodec, ArchiveEntry, EntryInput, EntrySource, FileVisitor, WriteSummary};
use crate::error::AppError;

/// Gzip-compressed tar, the on-disk snapshot format.
#[derive(Debug, Clone, Copy)]
pub struct TarGzCodec {
    level: Compression,
}

impl Default for TarGzCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl TarGzCodec {
    fn open(&self, archive: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>, AppError> {
        let file = File::open(archive)?;
        Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
    }

    fn write_to(&self, path: &Path, entries: &[EntryInput]) -> Result<WriteSummary, AppError> {
        let file = File::create(path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), self.level);
        let mut builder = tar::Builder::new(encoder);
        let mut summary = WriteSummary::default();
        let total = entries.len();

        for (index, entry) in entries.iter().enumerate() {
            match &entry.source {
                EntrySource::Bytes(data) => {
                    let mut header = file_header(data.len() as u64, 0);
                    builder.append_data(&mut header, &entry.path, data.as_slice())?;
                }
                EntrySource::File(source) => {
                    let opened = File::open(source).and_then(|f| f.metadata().map(|m| (f, m)));
                    let (file, meta) = match opened {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(path = %source.display(), error = %e, "Skipping unreadable file");
                            summary.skipped.push(entry.path.clone());
                            continue;
                        }
                    };
                    let mut header = file_header(meta.len(), mtime_secs(meta.modified()));
                    builder.append_data(&mut header, &entry.path, file.take(meta.len()))?;
                }
            }
            summary.file_count += 1;

            if (index + 1) % 100 == 0 {
                tracing::info!(processed = index + 1, total, "Packing snapshot");
            }
        }

        let encoder = builder.into_inner()?;
        let writer = encoder.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(summary)
    }
}

fn file_header(size: u64, mtime: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn corrupt(archive: &Path, e: io::Error) -> AppError {
    AppError::CorruptArchive(format!("{}: {}", archive.display(), e))
}

fn describe<R: Read>(entry: &tar::Entry<'_, R>) -> Option<ArchiveEntry> {
    let header = entry.header();
    let kind = header.entry_type();
    let is_dir = kind.is_dir();
    if !is_dir && !kind.is_file() {
        tracing::debug!(kind = ?kind, "Ignoring non-file archive entry");
        return None;
    }
    let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    Some(ArchiveEntry {
        path: entry_path::normalize_entry_name(&raw),
        size: header.size().unwrap_or(0),
        is_dir,
        mtime: header.mtime().unwrap_or(0),
    })
}

impl ArchiveCodec for TarGzCodec {
    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    fn write(&self, dest: &Path, entries: &[EntryInput]) -> Result<WriteSummary, AppError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(dest);
        match self.write_to(&partial, entries) {
            Ok(mut summary) => {
                std::fs::rename(&partial, dest)?;
                summary.size = std::fs::metadata(dest)?.len();
                Ok(summary)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn read_all(&self, archive: &Path) -> Result<Vec<ArchiveEntry>, AppError> {
        let mut tar = self.open(archive)?;
        let mut out = Vec::new();
        for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
            let entry = entry.map_err(|e| corrupt(archive, e))?;
            if let Some(described) = describe(&entry) {
                out.push(described);
            }
        }
        Ok(out)
    }

    fn for_each_file(&self, archive: &Path, visit: &mut FileVisitor<'_>) -> Result<(), AppError> {
        let mut tar = self.open(archive)?;
        for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
            let mut entry = entry.map_err(|e| corrupt(archive, e))?;
            let Some(described) = describe(&entry) else {
                continue;
            };
            if described.is_dir {
                continue;
            }
            visit(&described, &mut entry)?;
        }
        Ok(())
    }

    fn read_one(&self, archive: &Path, path: &str) -> Result<Vec<u8>, AppError> {
        let mut tar = self.open(archive)?;
        for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
            let mut entry = entry.map_err(|e| corrupt(archive, e))?;
            match describe(&entry) {
                Some(described) if !described.is_dir && described.path == path => {
                    let mut buf = Vec::with_capacity(described.size as usize);
                    entry.read_to_end(&mut buf).map_err(|e| corrupt(archive, e))?;
                    return Ok(buf);
                }
                _ => {}
            }
        }
        Err(AppError::NotFound(format!("{} is not in the snapshot", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tar_gz(dest: &Path, name: &str, data: &[u8]) {
        let file = File::create(dest).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn write_then_read_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("on-disk.txt");
        std::fs::write(&src, b"from disk").unwrap();
        let archive = tmp.path().join("snap.tar.gz");

        let codec = TarGzCodec::default();
        let summary = codec
            .write(
                &archive,
                &[
                    EntryInput::bytes("a.txt", b"alpha".to_vec()),
                    EntryInput::file("nested/dir/b.txt", &src),
                ],
            )
            .unwrap();

        assert_eq!(summary.file_count, 2);
        assert!(summary.size > 0);
        assert!(!partial_path(&archive).exists());

        let entries = codec.read_all(&archive).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "nested/dir/b.txt"]);
        assert_eq!(entries[1].size, 9);

        assert_eq!(codec.read_one(&archive, "nested/dir/b.txt").unwrap(), b"from disk");
        assert!(matches!(
            codec.read_one(&archive, "missing.txt"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn unreadable_sources_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("snap.tar.gz");
        let codec = TarGzCodec::default();
        let summary = codec
            .write(
                &archive,
                &[
                    EntryInput::bytes("kept.txt", b"x".to_vec()),
                    EntryInput::file("gone.txt", tmp.path().join("does-not-exist")),
                ],
            )
            .unwrap();
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.skipped, vec!["gone.txt".to_string()]);
    }

    #[test]
    fn extraction_rejects_parent_segments_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.tar.gz");
        raw_tar_gz(&archive, "../../etc/passwd", b"root::0:0");

        let dest = tmp.path().join("out");
        let codec = TarGzCodec::default();
        let err = codec.extract_all(&archive, &dest).unwrap_err();
        assert!(matches!(err, AppError::UnsafeArchive(_)));
        assert!(!dest.exists());
        assert!(!tmp.path().join("etc").exists());
    }

    #[test]
    fn garbage_is_a_corrupt_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("junk.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();
        let err = TarGzCodec::default().read_all(&archive).unwrap_err();
        assert!(matches!(err, AppError::CorruptArchive(_)));
    }

    #[test]
    fn empty_archive_only_fails_untrusted_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("empty.tar.gz");
        let codec = TarGzCodec::default();
        codec.write(&archive, &[]).unwrap();

        assert!(codec.validate(&archive, true).unwrap().is_empty());
        assert!(matches!(
            codec.validate(&archive, false),
            Err(AppError::CorruptArchive(_))
        ));
    }

    #[test]
    fn leading_dot_slash_entries_are_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("dot.tar.gz");
        raw_tar_gz(&archive, "./readme.md", b"# hi");

        let codec = TarGzCodec::default();
        let dest = tmp.path().join("out");
        assert_eq!(codec.extract_all(&archive, &dest).unwrap(), 1);
        assert_eq!(std::fs::read(dest.join("readme.md")).unwrap(), b"# hi");
    }
}
