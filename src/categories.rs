//! Directory categories that make up a container's content.
//!
//! Each category is a path relative to the working tree root (and, with the
//! same relative path, to an archive slot). A category never touches the
//! categories nested below it, nor the archive's own infrastructure files.

use std::path::{Path, PathBuf};

use crate::paths::{ARCHIVE_DIR_NAME, DESCRIPTOR_FILE_NAME, LOCK_FILE_NAME, SETTINGS_FILE_NAME};

/// Top-level areas of the working tree that belong to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Library,
    LibraryCaches,
    LibraryPreferences,
    Documents,
    Tmp,
}

impl Category {
    /// Every category, in swap order
    pub fn all() -> [Category; 5] {
        [
            Category::Library,
            Category::LibraryCaches,
            Category::LibraryPreferences,
            Category::Documents,
            Category::Tmp,
        ]
    }

    /// Path relative to the working tree or archive slot root
    pub fn relative_path(&self) -> &'static str {
        match self {
            Category::Library => "Library",
            Category::LibraryCaches => "Library/Caches",
            Category::LibraryPreferences => "Library/Preferences",
            Category::Documents => "Documents",
            Category::Tmp => "tmp",
        }
    }

    /// Location of this category under `root`
    pub fn dir_in(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }

    /// Path suffixes this category must never move, copy, or delete
    pub fn excludes(&self) -> Vec<String> {
        let nested_prefix = format!("{}/", self.relative_path());
        let mut excludes: Vec<String> = Category::all()
            .iter()
            .map(Category::relative_path)
            .filter(|path| path.starts_with(&nested_prefix))
            .map(str::to_string)
            .collect();

        excludes.extend(
            [ARCHIVE_DIR_NAME, SETTINGS_FILE_NAME, DESCRIPTOR_FILE_NAME, LOCK_FILE_NAME]
                .into_iter()
                .map(str::to_string),
        );
        excludes
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Library => "Library",
            Category::LibraryCaches => "Caches",
            Category::LibraryPreferences => "Preferences",
            Category::Documents => "Documents",
            Category::Tmp => "Temporary files",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_excludes_its_children() {
        let excludes = Category::Library.excludes();
        assert!(excludes.contains(&"Library/Caches".to_string()));
        assert!(excludes.contains(&"Library/Preferences".to_string()));
        assert!(excludes.contains(&ARCHIVE_DIR_NAME.to_string()));
    }

    #[test]
    fn test_leaf_categories_exclude_only_infrastructure() {
        for category in [Category::LibraryCaches, Category::Documents, Category::Tmp] {
            let excludes = category.excludes();
            assert_eq!(excludes.len(), 4, "{:?}", category);
            assert!(excludes.contains(&SETTINGS_FILE_NAME.to_string()));
            assert!(excludes.contains(&DESCRIPTOR_FILE_NAME.to_string()));
        }
    }

    #[test]
    fn test_documents_does_not_exclude_lookalikes() {
        // "Library/Caches" must not leak into an unrelated category.
        assert!(!Category::Documents
            .excludes()
            .iter()
            .any(|e| e.starts_with("Library")));
    }

    #[test]
    fn test_dir_in() {
        let root = Path::new("/slot");
        assert_eq!(
            Category::LibraryPreferences.dir_in(root),
            PathBuf::from("/slot/Library/Preferences")
        );
    }
}
