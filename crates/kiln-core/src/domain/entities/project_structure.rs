use std::collections::HashSet;
use std::path::PathBuf;

use crate::domain::{
    entities::common::{Permissions, RelativePath},
    error::DomainError,
};

/// Rendered output ready for the atomic writer.
///
/// Produced by the renderer; carries no behaviour beyond lookup and
/// validation.
#[derive(Debug, Clone, Default)]
pub struct ProjectStructure {
    pub(crate) files: Vec<FileToWrite>,
}

impl ProjectStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: RelativePath, content: FileContent, perms: Permissions) {
        self.files.push(FileToWrite {
            path,
            content,
            permissions: perms,
        });
    }

    pub fn with_file(mut self, path: RelativePath, content: FileContent, perms: Permissions) -> Self {
        self.add_file(path, content, perms);
        self
    }

    /// Replace the entry at `file.path`, or append it.
    pub fn upsert(&mut self, file: FileToWrite) {
        match self.files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
    }

    pub fn remove(&mut self, path: &RelativePath) -> Option<FileToWrite> {
        let index = self.files.iter().position(|f| &f.path == path)?;
        Some(self.files.remove(index))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for file in &self.files {
            if !seen.insert(file.path.as_str()) {
                return Err(DomainError::DuplicatePath {
                    path: file.path.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, path: &RelativePath) -> Option<&FileToWrite> {
        self.files.iter().find(|f| &f.path == path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileToWrite> {
        self.files.iter()
    }

    pub fn into_files(self) -> Vec<FileToWrite> {
        self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.files.iter().map(|f| &f.path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<FileToWrite> for ProjectStructure {
    fn from_iter<I: IntoIterator<Item = FileToWrite>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    /// Copy the bytes of a file in the template tree.
    Copy(PathBuf),
}

impl FileContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Copy(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToWrite {
    pub path: RelativePath,
    pub content: FileContent,
    pub permissions: Permissions,
}

impl FileToWrite {
    pub fn text(path: RelativePath, content: impl Into<String>) -> Self {
        Self {
            path,
            content: FileContent::Text(content.into()),
            permissions: Permissions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RelativePath {
        RelativePath::try_new(s).unwrap()
    }

    #[test]
    fn validates_duplicates() {
        let structure: ProjectStructure = [
            FileToWrite::text(path("main.rs"), ""),
            FileToWrite::text(path("./main.rs"), ""),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            structure.validate(),
            Err(DomainError::DuplicatePath { .. })
        ));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut structure = ProjectStructure::new()
            .with_file(path("a"), FileContent::Text("1".into()), Permissions::default())
            .with_file(path("b"), FileContent::Text("2".into()), Permissions::default());
        structure.upsert(FileToWrite::text(path("a"), "3"));
        let order: Vec<_> = structure.paths().map(|p| p.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
        assert_eq!(structure.get(&path("a")).unwrap().content.as_text(), Some("3"));
    }
}
