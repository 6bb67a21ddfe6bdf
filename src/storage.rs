//! Artifact naming and creation.
//!
//! The client names its upload; the server decides where the bytes land.
//! Two rules apply before a session's output file is opened:
//! - The requested name is reduced to its final path component, so a client
//!   cannot steer writes outside the output directory.
//! - If a file of that name already exists, a numeric disambiguator is
//!   inserted before the extension: `name.ext` → `name(1).ext` →
//!   `name(2).ext` … until a free name is found.
//!
//! Creation uses `create_new`, so the check-then-create step is atomic at
//! the filesystem level and two concurrently resolved names can never
//! collide.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

/// Create the output file for `requested` inside `dir`.
///
/// Returns the resolved path together with the freshly created (exclusive)
/// file handle.  Fails with `InvalidInput` when `requested` has no usable
/// final path component (empty, `..`, a bare separator).
pub async fn create_unique(dir: &Path, requested: &str) -> io::Result<(PathBuf, File)> {
    let base = Path::new(requested)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "unusable artifact name")
        })?;

    let (stem, ext) = split_extension(base);

    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            base.to_owned()
        } else {
            format!("{stem}({attempt}){ext}")
        };
        let path = dir.join(candidate);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Split `name` at its last dot: `"report.txt"` → `("report", ".txt")`,
/// `"archive"` → `("archive", "")`.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) => name.split_at(i),
        None => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_use_keeps_requested_name() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _file) = create_unique(dir.path(), "report.txt").await.unwrap();
        assert_eq!(path, dir.path().join("report.txt"));
    }

    #[tokio::test]
    async fn collision_inserts_disambiguator() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _f1) = create_unique(dir.path(), "report.txt").await.unwrap();
        let (second, _f2) = create_unique(dir.path(), "report.txt").await.unwrap();
        assert_eq!(first, dir.path().join("report.txt"));
        assert_eq!(second, dir.path().join("report(1).txt"));
    }

    #[tokio::test]
    async fn repeated_collisions_count_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(create_unique(dir.path(), "data.bin").await.unwrap());
        }
        let names: Vec<_> = handles
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["data.bin", "data(1).bin", "data(2).bin", "data(3).bin"]);
    }

    #[tokio::test]
    async fn no_extension_appends_after_name() {
        let dir = tempfile::tempdir().unwrap();
        let _ = create_unique(dir.path(), "archive").await.unwrap();
        let (second, _) = create_unique(dir.path(), "archive").await.unwrap();
        assert_eq!(second, dir.path().join("archive(1)"));
    }

    #[tokio::test]
    async fn path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = create_unique(dir.path(), "../../etc/passwd").await.unwrap();
        assert_eq!(path, dir.path().join("passwd"));
    }

    #[tokio::test]
    async fn bare_parent_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_unique(dir.path(), "..").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn split_extension_cases() {
        assert_eq!(split_extension("report.txt"), ("report", ".txt"));
        assert_eq!(split_extension("archive"), ("archive", ""));
        assert_eq!(split_extension("a.b.c"), ("a.b", ".c"));
        assert_eq!(split_extension(".hidden"), ("", ".hidden"));
    }
}
