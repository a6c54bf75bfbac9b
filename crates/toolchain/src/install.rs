//! Archive extraction and executable placement.

use crate::error::{Error, Result};
use crate::types::{ArchiveKind, Platform};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Cursor, Read};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Pull the binary out of a downloaded artifact.
pub fn extract(bytes: &[u8], archive: ArchiveKind, platform: &Platform, version: &str) -> Result<Vec<u8>> {
    match archive {
        ArchiveKind::Raw => Ok(bytes.to_vec()),
        ArchiveKind::TarGz { member } => {
            let member = platform.render(member, version);
            extract_tar_gz(bytes, &member)
        }
        ArchiveKind::Zip { member } => {
            let member = platform.render(member, version);
            extract_zip(bytes, &member)
        }
    }
}

fn extract_tar_gz(bytes: &[u8], member: &str) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let entries = archive
        .entries()
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ExtractionFailed(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
        if path.as_ref() == Path::new(member) {
            let mut out = Vec::new();
            entry
                .read_to_end(&mut out)
                .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
            return Ok(out);
        }
    }
    Err(Error::ExtractionFailed(format!(
        "{member} not found in tarball"
    )))
}

fn extract_zip(bytes: &[u8], member: &str) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
    let mut file = archive
        .by_name(member)
        .map_err(|e| Error::ExtractionFailed(format!("{member}: {e}")))?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
    Ok(out)
}

/// Write `contents` to `dir/name` with mode 0755.
///
/// The binary is written next to its destination and renamed into place,
/// so a running copy is never truncated.
pub fn write_executable(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let target = dir.join(name);
    let staging = dir.join(format!(".{name}.partial"));

    fs::write(&staging, contents).map_err(|e| Error::io(&staging, e))?;

    #[cfg(unix)]
    {
        let perms = fs::Permissions::from_mode(0o755);
        fs::set_permissions(&staging, perms).map_err(|e| Error::io(&staging, e))?;
    }

    if let Err(e) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(Error::io(&target, e));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn tar_gz_with(path: &str, data: &[u8]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn zip_with(path: &str, data: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(path, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_raw() {
        let platform = Platform::new("linux", "amd64");
        let out = extract(b"binary", ArchiveKind::Raw, &platform, "1.0.0").unwrap();
        assert_eq!(out, b"binary");
    }

    #[test]
    fn test_extract_tar_gz_member_template() {
        let platform = Platform::new("linux", "arm64");
        let tarball = tar_gz_with("linux-arm64/helm", b"helm-bin");
        let out = extract(
            &tarball,
            ArchiveKind::TarGz {
                member: "{os}-{arch}/helm",
            },
            &platform,
            "3.16.1",
        )
        .unwrap();
        assert_eq!(out, b"helm-bin");
    }

    #[test]
    fn test_extract_tar_gz_missing_member() {
        let platform = Platform::new("linux", "amd64");
        let tarball = tar_gz_with("linux-arm64/helm", b"helm-bin");
        let err = extract(
            &tarball,
            ArchiveKind::TarGz {
                member: "{os}-{arch}/helm",
            },
            &platform,
            "3.16.1",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }

    #[test]
    fn test_extract_zip() {
        let platform = Platform::new("linux", "amd64");
        let archive = zip_with("terraform", b"tf-bin");
        let out = extract(
            &archive,
            ArchiveKind::Zip {
                member: "terraform",
            },
            &platform,
            "1.9.5",
        )
        .unwrap();
        assert_eq!(out, b"tf-bin");
    }

    #[test]
    fn test_write_executable() {
        let temp = TempDir::new().unwrap();
        let path = write_executable(temp.path(), "sops", b"#!/bin/sh\n").unwrap();
        assert_eq!(path, temp.path().join("sops"));
        assert_eq!(fs::read(&path).unwrap(), b"#!/bin/sh\n");
        assert!(!temp.path().join(".sops.partial").exists());

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
