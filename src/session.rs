use crate::extract::FileSet;
use crate::package::PackagedArchive;

/// Per-user state carried between actions.
///
/// Replaced wholesale by each successful generation, never patched in place.
#[derive(Debug, Default)]
pub struct Session {
    prompt: Option<String>,
    files: Option<FileSet>,
    archive: Option<PackagedArchive>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new generation. The previous archive is dropped, which deletes it.
    pub fn record(&mut self, prompt: String, files: FileSet) -> &FileSet {
        self.prompt = Some(prompt);
        self.archive = None;
        self.files.insert(files)
    }

    pub fn set_archive(&mut self, archive: PackagedArchive) -> &PackagedArchive {
        self.archive.insert(archive)
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn files(&self) -> Option<&FileSet> {
        self.files.as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
