use crate::error::StorageError;
use crate::extract::FileSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

pub const ARCHIVE_NAME: &str = "project.zip";

/// Prompt-independent files added to every package, written after the generated ones.
pub const BOILERPLATE: [(&str, &str); 3] = [
    (
        "requirements.txt",
        "streamlit\npython-dotenv\ngoogle-generativeai\n",
    ),
    (".env", "GEMINI_API_KEY=your-generated-app-key\n"),
    (
        "README.md",
        "# Generated Streamlit App\n\nRun with:\n```\nstreamlit run app.py\n```",
    ),
];

/// A zip archive inside its own build directory.
///
/// The directory, archive included, is removed when this value is dropped.
#[derive(Debug)]
pub struct PackagedArchive {
    _dir: TempDir,
    path: PathBuf,
    entries: usize,
}

impl PackagedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of files written into the archive.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Copy the archive out of the build directory.
    pub fn persist_to(&self, dest: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::copy(self.path(), dest).map_err(|source| StorageError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(dest.to_path_buf())
    }
}

/// Write `files` plus [`BOILERPLATE`] into a fresh build directory and zip it.
///
/// The directory goes under `build_root` when given, otherwise the system temp dir.
pub fn package_project(
    files: &FileSet,
    build_root: Option<&Path>,
) -> Result<PackagedArchive, StorageError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("appgen-");
    let dir = match build_root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(StorageError::CreateDir)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
    .map_err(StorageError::CreateDir)?;

    for (name, contents) in files.iter() {
        write_entry(dir.path(), name, contents)?;
    }
    for (name, contents) in BOILERPLATE {
        write_entry(dir.path(), name, contents)?;
    }

    let path = dir.path().join(ARCHIVE_NAME);
    let entries = zip_dir(dir.path(), &path)?;
    tracing::info!(archive = %path.display(), entries, "packaged project");

    Ok(PackagedArchive {
        _dir: dir,
        path,
        entries,
    })
}

fn write_entry(root: &Path, name: &str, contents: &str) -> Result<(), StorageError> {
    let plain = Path::new(name)
        .file_name()
        .is_some_and(|f| f == std::ffi::OsStr::new(name));
    if !plain || name == ARCHIVE_NAME {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    let path = root.join(name);
    std::fs::write(&path, contents).map_err(|source| StorageError::Write { path, source })
}

/// Zip every regular file under `root` except archives, named relative to `root`.
fn zip_dir(root: &Path, archive: &Path) -> Result<usize, StorageError> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() == ARCHIVE_NAME {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| StorageError::InvalidName(entry.path().display().to_string()))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        sources.push((name, entry.into_path()));
    }

    let write_err = |source| StorageError::Write {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::create(archive).map_err(write_err)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, path) in &sources {
        let bytes = std::fs::read(path).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes).map_err(write_err)?;
    }
    zip.finish()?;

    Ok(sources.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_files, ExtractPolicy};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn read_archive(path: &Path) -> Vec<(String, String)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut f = archive.by_index(i).unwrap();
            let mut s = String::new();
            f.read_to_string(&mut s).unwrap();
            out.push((f.name().to_string(), s));
        }
        out.sort();
        out
    }

    #[test]
    fn hello_world_packages_four_entries() {
        let scratch = tempfile::tempdir().unwrap();
        let files = extract_files(ExtractPolicy::WholeText, "hello world");
        let packaged = package_project(&files, Some(scratch.path())).unwrap();

        assert_eq!(packaged.entries(), files.len() + BOILERPLATE.len());
        assert!(packaged.path().starts_with(scratch.path()));
        assert_eq!(
            read_archive(packaged.path()),
            vec![
                (".env".to_string(), "GEMINI_API_KEY=your-generated-app-key\n".to_string()),
                (
                    "README.md".to_string(),
                    "# Generated Streamlit App\n\nRun with:\n```\nstreamlit run app.py\n```".to_string()
                ),
                ("app.py".to_string(), "hello world".to_string()),
                (
                    "requirements.txt".to_string(),
                    "streamlit\npython-dotenv\ngoogle-generativeai\n".to_string()
                ),
            ]
        );
    }

    #[test]
    fn boilerplate_replaces_colliding_entries() {
        let scratch = tempfile::tempdir().unwrap();
        let raw = "app.py\n```\nprint(1)\n```\nrequirements.txt\n```\nstreamlit\n```";
        let files = extract_files(ExtractPolicy::Markers, raw);
        let packaged = package_project(&files, Some(scratch.path())).unwrap();

        let entries = read_archive(packaged.path());
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![".env", "README.md", "app.py", "requirements.txt"]);
        assert_eq!(entries[3].1, BOILERPLATE[0].1);
    }

    #[test]
    fn packaging_twice_gives_independent_archives() {
        let scratch = tempfile::tempdir().unwrap();
        let files = FileSet::new("x = 1");
        let a = package_project(&files, Some(scratch.path())).unwrap();
        let b = package_project(&files, Some(scratch.path())).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(read_archive(a.path()), read_archive(b.path()));
    }

    #[test]
    fn dropping_the_archive_removes_its_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let packaged = package_project(&FileSet::new(""), Some(scratch.path())).unwrap();
        let dir = packaged.path().parent().unwrap().to_path_buf();
        assert!(dir.join(ARCHIVE_NAME).is_file());
        drop(packaged);
        assert!(!dir.exists());
    }

    #[test]
    fn persist_copies_archive_out() {
        let scratch = tempfile::tempdir().unwrap();
        let packaged = package_project(&FileSet::new("print(1)"), Some(scratch.path())).unwrap();
        let dest = scratch.path().join("out").join("project.zip");
        packaged.persist_to(&dest).unwrap();
        drop(packaged);
        assert_eq!(read_archive(&dest).len(), 4);
    }

    #[test]
    fn unwritable_build_root_is_a_storage_error() {
        let scratch = tempfile::tempdir().unwrap();
        let blocker = scratch.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let err = package_project(&FileSet::new(""), Some(&blocker)).unwrap_err();
        assert!(matches!(err, StorageError::CreateDir(_)));
    }

    #[test]
    fn write_entry_rejects_paths() {
        let scratch = tempfile::tempdir().unwrap();
        for bad in ["../evil.py", "dir/app.py", "", ARCHIVE_NAME] {
            let err = write_entry(scratch.path(), bad, "x").unwrap_err();
            assert!(matches!(err, StorageError::InvalidName(_)), "{bad}");
        }
    }
}
