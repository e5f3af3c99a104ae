use crate::error::{CollectorError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn deflated() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Bundle files into an in-memory deflate zip, each stored under its base name.
pub fn bundle_files(file_paths: &[PathBuf]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for file_path in file_paths {
        let entry_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CollectorError::InvalidFormat(format!(
                    "File '{}' has no usable name",
                    file_path.display()
                ))
            })?;

        zip.start_file(entry_name, deflated())?;
        copy_into(&mut zip, file_path)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Zip `root/dir_name` into `dest`, with every entry under `dir_name/`.
/// Returns the archive size in bytes.
pub fn zip_directory(root: &Path, dir_name: &str, dest: &Path) -> Result<u64> {
    let source = root.join(dir_name);
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for entry in WalkDir::new(&source).sort_by_file_name() {
        let entry = entry.map_err(|e| CollectorError::Io(e.into()))?;
        let relative = entry.path().strip_prefix(root).map_err(|_| {
            CollectorError::InvalidFormat(format!(
                "'{}' is outside of '{}'",
                entry.path().display(),
                root.display()
            ))
        })?;
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(entry_name, deflated())?;
        } else if entry.file_type().is_file() {
            zip.start_file(entry_name, deflated())?;
            copy_into(&mut zip, entry.path())?;
        }
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(dest)?.len())
}

/// Inflate a gzip payload, as served by single-file feeds.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated).map_err(|e| {
        CollectorError::InvalidFormat(format!("Payload is not valid gzip: {}", e))
    })?;
    Ok(inflated)
}

/// Regular-file members of a `.tar.gz` payload as `(member path, content)`,
/// in archive order.
pub fn untar_gz(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let invalid = |e: std::io::Error| {
        CollectorError::InvalidFormat(format!("Payload is not a valid tar.gz: {}", e))
    };
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut members = Vec::new();

    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path().map_err(invalid)?.to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(invalid)?;
        members.push((name, content));
    }

    Ok(members)
}

fn copy_into<W: Write + Seek>(zip: &mut ZipWriter<W>, path: &Path) -> Result<()> {
    let mut source = File::open(path)?;
    let mut buffer = Vec::new();
    source.read_to_end(&mut buffer)?;
    zip.write_all(&buffer)?;
    Ok(())
}
