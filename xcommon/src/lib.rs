use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use zip::ZipArchive;

pub mod macho;

/// Extracts every entry of the zip archive at `archive` into `directory`.
///
/// The directory and its parents are created if they don't exist. Entries
/// whose names would resolve outside of `directory` are rejected.
pub fn extract_zip(archive: &Path, directory: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read archive {}", archive.display()))?;
    std::fs::create_dir_all(directory)?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => anyhow::bail!("refusing to extract unsafe entry {:?}", entry.name()),
        };
        let path = directory.join(name);
        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?,
        );
        std::io::copy(&mut entry, &mut out)?;
        out.flush()?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(())
}
