//! Build context archiving.
//!
//! The daemon receives the build context as an in-memory tar archive.
//! `.git` directories are excluded at every level; entries are appended
//! in sorted order so identical trees produce identical archives.

use bytes::Bytes;
use std::path::Path;
use tar::Builder;
use tracing::warn;

use shipit_core::{Error, Result};

/// Archive the build context rooted at `context`.
///
/// Fails with a build error when the Dockerfile is missing, since the
/// daemon would only report that after the whole context was shipped.
pub fn archive_context(context: &Path, dockerfile: &str) -> Result<Bytes> {
    if !context.join(dockerfile).is_file() {
        return Err(Error::Build(format!(
            "dockerfile {dockerfile:?} not found in context {}",
            context.display()
        )));
    }

    let mut builder = Builder::new(Vec::new());
    append_dir(&mut builder, context, Path::new(""))?;
    let data = builder.into_inner()?;
    Ok(Bytes::from(data))
}

fn append_dir(builder: &mut Builder<Vec<u8>>, root: &Path, rel: &Path) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(root.join(rel))?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let rel_path = rel.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if name == ".git" {
                continue;
            }
            builder.append_dir(&rel_path, entry.path())?;
            append_dir(builder, root, &rel_path)?;
        } else if file_type.is_file() {
            builder.append_path_with_name(entry.path(), &rel_path)?;
        } else {
            // Symlinks, sockets, and fifos cannot be shipped to the daemon.
            warn!(path = %rel_path.display(), "skipping irregular entry in build context");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry_paths(archive: &Bytes) -> Vec<String> {
        let mut reader = tar::Archive::new(archive.as_ref());
        reader
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn archives_files_and_excludes_git() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/app.py"), "print('hi')\n").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "[core]\n").unwrap();

        let archive = archive_context(dir.path(), "Dockerfile").unwrap();
        let paths = entry_paths(&archive);

        assert!(paths.iter().any(|p| p == "Dockerfile"));
        assert!(paths.iter().any(|p| p == "src/app.py"));
        assert!(!paths.iter().any(|p| p.starts_with(".git")));
    }

    #[test]
    fn missing_dockerfile_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.py"), "").unwrap();

        let err = archive_context(dir.path(), "Dockerfile").unwrap_err();
        assert!(matches!(err, Error::Build(_)));
        assert!(err.to_string().contains("Dockerfile"));
    }

    #[test]
    #[cfg(unix)]
    fn irregular_entries_are_left_out_of_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::os::unix::fs::symlink("missing-target", dir.path().join("dangling")).unwrap();

        let archive = archive_context(dir.path(), "Dockerfile").unwrap();
        let paths = entry_paths(&archive);

        assert!(paths.iter().any(|p| p == "Dockerfile"));
        assert!(!paths.iter().any(|p| p == "dangling"));
    }

    #[test]
    fn identical_trees_archive_identically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let first = archive_context(dir.path(), "Dockerfile").unwrap();
        let second = archive_context(dir.path(), "Dockerfile").unwrap();
        assert_eq!(first, second);
    }
}
