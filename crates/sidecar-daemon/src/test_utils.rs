//! Test utilities for process and archive fixtures
//!
//! Available to other crates through the `test-helpers` feature.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a POSIX shell script and marks it executable.
///
/// # Arguments
/// * `dir` - Directory to create the script in
/// * `name` - File name of the script
/// * `body` - Script body (a `#!/bin/sh` line is prepended)
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create script dir");
    }
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// Writes a zip archive containing the given `(name, contents)` entries.
///
/// Entries are stored with mode `0o755` so extracted scripts stay executable.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);

    for (name, contents) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip");
}

/// `file://` URL for a local path
pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path)
        .expect("absolute path")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_zip_roundtrips_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        write_zip(&path, &[("x/y.txt", "1")]);

        let archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.file_names().any(|n| n == "x/y.txt"));
    }

    #[test]
    fn test_file_url() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_url(dir.path()).starts_with("file://"));
    }
}
