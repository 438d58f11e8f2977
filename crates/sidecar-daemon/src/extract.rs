//! Archive extraction for downloaded artifacts

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use sidecar_core::prelude::*;

/// Recognized archive containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    /// Tar inside gzip (`.tar.gz`, `.tgz`)
    TarGz,
    /// A single gzip-compressed file
    Gzip,
}

impl ArchiveKind {
    /// Detect the archive kind from the file name; `None` for anything else
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".gz") {
            Some(ArchiveKind::Gzip)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest` (blocking).
pub fn extract(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    info!(
        "Extracting {} ({:?}) into {}",
        archive.display(),
        kind,
        dest.display()
    );

    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => {
            let file = File::open(archive)?;
            tar::Archive::new(GzDecoder::new(file))
                .unpack(dest)
                .map_err(|e| Error::extract(archive, e.to_string()))
        }
        ArchiveKind::Gzip => {
            let out = dest.join(gunzipped_name(archive));
            let mut decoder = GzDecoder::new(File::open(archive)?);
            let mut file = File::create(&out)?;
            io::copy(&mut decoder, &mut file).map_err(|e| Error::extract(archive, e.to_string()))?;
            Ok(())
        }
    }
}

/// Extract on the blocking thread pool
pub async fn extract_async(archive: PathBuf, kind: ArchiveKind, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || extract(&archive, kind, &dest))
        .await
        .map_err(|e| Error::process(format!("extraction task failed: {}", e)))?
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| Error::extract(archive, e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::extract(archive, e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::extract(
                archive,
                format!("entry '{}' escapes the target directory", entry.name()),
            ));
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file).map_err(|e| Error::extract(archive, e.to_string()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// `tool.gz` -> `tool`
fn gunzipped_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match name.len().checked_sub(3) {
        Some(cut) if name.to_ascii_lowercase().ends_with(".gz") && cut > 0 => {
            name[..cut].to_string()
        }
        _ => format!("{}.out", name),
    }
}
