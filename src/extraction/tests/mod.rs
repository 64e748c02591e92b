use crate::error::Error;
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a tar archive holding `files` (paths relative to the archive root)
fn create_tar_archive(archive_path: &Path, files: &[(&str, &[u8], u32)]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut builder = ::tar::Builder::new(file);
    for (name, content, mode) in files {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.finish().unwrap();
}

/// A cache tree laid out the way the platform ships it
fn sector_cache_files() -> Vec<(&'static str, &'static [u8], u32)> {
    vec![
        ("s-t01000-21/p_aux", b"aux-bytes", 0o644),
        ("s-t01000-21/t_aux", b"t-aux-bytes", 0o644),
        ("s-t01000-21/sc-02-data-tree-r-last-0.dat", b"tree-data", 0o600),
    ]
}

// ---------------------------------------------------------------------------
// TarExtractor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unpack_preserves_directory_structure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cache.tar");
    create_tar_archive(&archive, &sector_cache_files());

    let dest = temp.path().join("cache");
    let files = unpack_tar(&archive, &dest).await.unwrap();

    assert_eq!(files.len(), 3);
    assert_eq!(
        std::fs::read(dest.join("s-t01000-21/t_aux")).unwrap(),
        b"t-aux-bytes"
    );
    assert!(dest.join("s-t01000-21/sc-02-data-tree-r-last-0.dat").is_file());
    assert_eq!(files[0], dest.join("s-t01000-21/p_aux"));
}

#[cfg(unix)]
#[tokio::test]
async fn unpack_preserves_file_modes() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cache.tar");
    create_tar_archive(&archive, &[("s-t01000-7/run.sh", b"#!/bin/sh\n", 0o750)]);

    let dest = temp.path().join("cache");
    unpack_tar(&archive, &dest).await.unwrap();

    let mode = std::fs::metadata(dest.join("s-t01000-7/run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[tokio::test]
async fn unpack_overwrites_existing_files() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cache.tar");
    create_tar_archive(&archive, &[("s-t01000-7/p_aux", b"fresh", 0o644)]);

    let dest = temp.path().join("cache");
    std::fs::create_dir_all(dest.join("s-t01000-7")).unwrap();
    std::fs::write(dest.join("s-t01000-7/p_aux"), b"stale contents from a prior run").unwrap();

    unpack_tar(&archive, &dest).await.unwrap();
    assert_eq!(std::fs::read(dest.join("s-t01000-7/p_aux")).unwrap(), b"fresh");
}

#[tokio::test]
async fn corrupt_archive_is_an_unpack_error() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cache.tar");
    std::fs::write(&archive, vec![b'x'; 1024]).unwrap();

    let err = unpack_tar(&archive, &temp.path().join("cache"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Unpack { .. }),
        "expected Unpack error, got {err:?}"
    );
    assert_eq!(err.error_code(), "unpack_failed");
}

#[tokio::test]
async fn missing_archive_is_an_io_error() {
    let temp = TempDir::new().unwrap();
    let err = unpack_tar(&temp.path().join("absent.tar"), &temp.path().join("cache"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "expected Io error, got {err:?}");
}

#[test]
fn directories_are_not_reported_as_files() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cache.tar");

    let file = std::fs::File::create(&archive).unwrap();
    let mut builder = ::tar::Builder::new(file);
    let mut dir = ::tar::Header::new_gnu();
    dir.set_entry_type(::tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_cksum();
    builder
        .append_data(&mut dir, "s-t01000-9/", std::io::empty())
        .unwrap();
    let mut header = ::tar::Header::new_gnu();
    header.set_size(4);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "s-t01000-9/p_aux", &b"data"[..])
        .unwrap();
    builder.finish().unwrap();
    drop(builder);

    let dest = temp.path().join("cache");
    let files = TarExtractor::extract(&archive, &dest).unwrap();
    assert_eq!(files, vec![dest.join("s-t01000-9/p_aux")]);
    assert!(dest.join("s-t01000-9").is_dir());
}
