//! Compressed package archives (.tar.gz)
//!
//! Entries are written in sorted path order with normalized mtime and
//! ownership, so the same package directory always produces the same tar
//! stream. Permission bits are kept as found on disk.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use walkdir::WalkDir;

use super::{io_err, PackageError};

/// Compress `package_dir` into `archive_path`, returning the archive size.
pub fn write_archive(package_dir: &Path, archive_path: &Path) -> Result<u64, PackageError> {
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file = File::create(archive_path).map_err(|e| io_err(archive_path, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in WalkDir::new(package_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        let rel_path = path
            .strip_prefix(package_dir)
            .map_err(|_| PackageError::PathNotInPackage(path.to_path_buf()))?;

        // Skip root itself
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let metadata = entry.metadata()?;
        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(permission_bits(&metadata));

        if metadata.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder
                .append_data(&mut header, rel_path, io::empty())
                .map_err(|e| io_err(path, e))?;
        } else if metadata.is_file() {
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());
            let reader = BufReader::new(File::open(path).map_err(|e| io_err(path, e))?);
            builder
                .append_data(&mut header, rel_path, reader)
                .map_err(|e| io_err(path, e))?;
        }
    }

    let encoder = builder.into_inner().map_err(|e| io_err(archive_path, e))?;
    let mut writer = encoder.finish().map_err(|e| io_err(archive_path, e))?;
    writer.flush().map_err(|e| io_err(archive_path, e))?;
    drop(writer);

    let size = fs::metadata(archive_path)
        .map_err(|e| io_err(archive_path, e))?
        .len();
    Ok(size)
}

/// Unpack an archive written by [`write_archive`] into `dest`.
///
/// Entries that would land outside `dest` are skipped by the tar reader.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), PackageError> {
    fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    let file = File::open(archive_path).map_err(|e| io_err(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(|e| io_err(archive_path, e))?;
    Ok(())
}

fn permission_bits(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        if metadata.is_dir() {
            0o755
        } else {
            0o644
        }
    }
}
