//! Filesystem utility functions
//!
//! This module holds the tree mover used by every swap: moving, copying and
//! clearing the children of a directory while leaving excluded paths alone.
//!
//! Excludes are relative path suffixes matched component-wise against the full
//! path of every entry (`Library/Caches` matches `/any/root/Library/Caches`).
//! A directory that contains an excluded path somewhere below it is never
//! moved or deleted wholesale; it is recursed into instead.
//!
//! All three tree operations treat a missing source as a no-op. Any I/O error
//! aborts the call; entries that were already moved are gone from the source,
//! so running the same move again picks up where it stopped.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};

/// Whether `path` ends with any of the excluded suffixes
pub fn is_excluded(path: &Path, excludes: &[String]) -> bool {
    excludes.iter().any(|suffix| path.ends_with(suffix))
}

/// Whether anything below `dir` is excluded
fn holds_excluded(dir: &Path, excludes: &[String]) -> bool {
    if excludes.is_empty() {
        return false;
    }
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| is_excluded(entry.path(), excludes))
}

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move every entry inside `src` into `dst`, creating `dst` if absent.
///
/// A moved entry replaces a same-named entry in `dst`, except that a directory
/// moved onto an existing directory is merged into it.
pub fn move_children(src: &Path, dst: &Path, excludes: &[String]) -> Result<()> {
    if !src.is_dir() || same_location(src, dst) {
        return Ok(());
    }

    fs::create_dir_all(dst).at("create directory", dst)?;

    for entry in fs::read_dir(src).at("read directory", src)? {
        let entry = entry.at("read directory entry", src)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if is_excluded(&from, excludes) {
            continue;
        }

        let file_type = entry.file_type().at("read file type", &from)?;
        if file_type.is_dir() && (to.is_dir() || holds_excluded(&from, excludes)) {
            move_children(&from, &to, excludes)?;
            remove_dir_if_empty(&from)?;
        } else {
            move_entry(&from, &to)?;
        }
    }

    Ok(())
}

/// Copy every entry inside `src` into `dst`, creating `dst` if absent.
pub fn copy_children(src: &Path, dst: &Path, excludes: &[String]) -> Result<()> {
    if !src.is_dir() || same_location(src, dst) {
        return Ok(());
    }

    fs::create_dir_all(dst).at("create directory", dst)?;

    for entry in fs::read_dir(src).at("read directory", src)? {
        let entry = entry.at("read directory entry", src)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if is_excluded(&from, excludes) {
            continue;
        }

        let file_type = entry.file_type().at("read file type", &from)?;
        if file_type.is_dir() {
            if to.symlink_metadata().is_ok() && !to.is_dir() {
                remove_entry(&to)?;
            }
            copy_children(&from, &to, excludes)?;
        } else {
            copy_entry(&from, &to, file_type.is_symlink())?;
        }
    }

    Ok(())
}

/// Delete everything inside `dir` except excluded entries.
///
/// Subdirectories emptied this way are removed too; `dir` itself is kept.
pub fn remove_children(dir: &Path, excludes: &[String]) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir).at("read directory", dir)? {
        let entry = entry.at("read directory entry", dir)?;
        let path = entry.path();

        if is_excluded(&path, excludes) {
            continue;
        }

        let file_type = entry.file_type().at("read file type", &path)?;
        if file_type.is_dir() && holds_excluded(&path, excludes) {
            remove_children(&path, excludes)?;
            remove_dir_if_empty(&path)?;
        } else {
            remove_entry(&path)?;
        }
    }

    Ok(())
}

/// Remove a file, symlink, or whole directory tree
pub fn remove_entry(path: &Path) -> Result<()> {
    let metadata = path.symlink_metadata().at("read metadata", path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).at("remove directory", path)
    } else {
        fs::remove_file(path).at("remove file", path)
    }
}

fn remove_dir_if_empty(dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir).at("read directory", dir)?;
    if entries.next().is_none() {
        fs::remove_dir(dir).at("remove directory", dir)?;
    }
    Ok(())
}

fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if to.symlink_metadata().is_ok() {
        remove_entry(to)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let file_type = from
                .symlink_metadata()
                .at("read metadata", from)?
                .file_type();
            if file_type.is_dir() {
                copy_children(from, to, &[])?;
            } else {
                copy_entry(from, to, file_type.is_symlink())?;
            }
            remove_entry(from)
        }
        Err(source) => Err(Error::Io {
            action: "move",
            path: from.to_path_buf(),
            source,
        }),
    }
}

fn copy_entry(from: &Path, to: &Path, is_symlink: bool) -> Result<()> {
    if to.is_dir() || (is_symlink && to.symlink_metadata().is_ok()) {
        remove_entry(to)?;
    }

    if is_symlink {
        let target = fs::read_link(from).at("read symlink", from)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, to).at("create symlink", to)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(&target, to).at("create symlink", to)?;
        return Ok(());
    }

    fs::copy(from, to).at("copy file", from)?;
    Ok(())
}

/// Total size in bytes of the regular files below `path`, skipping excluded
/// subtrees. Symbolic links are not followed.
pub fn dir_size(path: &Path, excludes: &[String]) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry.path(), excludes))
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}

/// Whether `dir` contains any regular file at any depth
pub fn has_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| !entry.file_type().is_dir())
}

/// Write a file atomically: write to a sibling temp file, then rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at("create directory", parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content).at("write", &temp_path)?;
    fs::rename(&temp_path, path).at("replace", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{read_file, write_file};
    use tempfile::TempDir;

    fn excludes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_move_children_moves_everything() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_file(&src.join("a.txt"), "a");
        write_file(&src.join("nested/b.txt"), "b");

        move_children(&src, &dst, &[]).unwrap();

        assert_eq!(read_file(&dst.join("a.txt")), "a");
        assert_eq!(read_file(&dst.join("nested/b.txt")), "b");
        assert!(src.is_dir());
        assert_eq!(fs::read_dir(&src).unwrap().count(), 0);
    }

    #[test]
    fn test_move_children_missing_source_is_noop() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("dst");
        move_children(&temp.path().join("missing"), &dst, &[]).unwrap();
        assert!(!dst.exists());
    }

    #[test]
    fn test_move_children_onto_itself_is_noop() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        write_file(&dir.join("a.txt"), "a");
        move_children(&dir, &dir, &[]).unwrap();
        assert_eq!(read_file(&dir.join("a.txt")), "a");
    }

    #[test]
    fn test_move_children_honors_nested_excludes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("Library");
        let dst = temp.path().join("slot/Library");
        write_file(&src.join("data.db"), "data");
        write_file(&src.join("Caches/c.bin"), "cache");
        write_file(&src.join("Support/keep/infra.json"), "infra");
        write_file(&src.join("Support/user.txt"), "user");

        let ex = excludes(&["Library/Caches", "infra.json"]);
        move_children(&src, &dst, &ex).unwrap();

        assert_eq!(read_file(&dst.join("data.db")), "data");
        assert_eq!(read_file(&dst.join("Support/user.txt")), "user");
        assert!(!dst.join("Caches").exists());
        assert!(!dst.join("Support/keep/infra.json").exists());
        assert_eq!(read_file(&src.join("Caches/c.bin")), "cache");
        assert_eq!(read_file(&src.join("Support/keep/infra.json")), "infra");
        assert!(!src.join("Support/user.txt").exists());
        assert!(!src.join("data.db").exists());
    }

    #[test]
    fn test_move_children_merges_into_existing_directories() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_file(&src.join("dir/new.txt"), "new");
        write_file(&src.join("same.txt"), "fresh");
        write_file(&dst.join("dir/old.txt"), "old");
        write_file(&dst.join("same.txt"), "stale");

        move_children(&src, &dst, &[]).unwrap();

        assert_eq!(read_file(&dst.join("dir/new.txt")), "new");
        assert_eq!(read_file(&dst.join("dir/old.txt")), "old");
        assert_eq!(read_file(&dst.join("same.txt")), "fresh");
        assert!(!src.join("dir").exists());
    }

    #[test]
    fn test_move_children_rerun_converges() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_file(&src.join("one.txt"), "1");
        write_file(&src.join("two.txt"), "2");

        // Simulate an interrupted run that already moved one entry.
        fs::create_dir_all(&dst).unwrap();
        fs::rename(src.join("one.txt"), dst.join("one.txt")).unwrap();

        move_children(&src, &dst, &[]).unwrap();
        move_children(&src, &dst, &[]).unwrap();

        assert_eq!(read_file(&dst.join("one.txt")), "1");
        assert_eq!(read_file(&dst.join("two.txt")), "2");
    }

    #[test]
    fn test_copy_children_leaves_source_intact() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_file(&src.join("a.txt"), "a");
        write_file(&src.join("deep/er/b.txt"), "b");
        write_file(&src.join("deep/skip.me"), "x");

        copy_children(&src, &dst, &excludes(&["skip.me"])).unwrap();

        assert_eq!(read_file(&src.join("a.txt")), "a");
        assert_eq!(read_file(&src.join("deep/er/b.txt")), "b");
        assert_eq!(read_file(&dst.join("a.txt")), "a");
        assert_eq!(read_file(&dst.join("deep/er/b.txt")), "b");
        assert!(!dst.join("deep/skip.me").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_children_keeps_symlinks_as_links() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_file(&src.join("real.txt"), "real");
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

        copy_children(&src, &dst, &[]).unwrap();

        let link = dst.join("link.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("real.txt"));
    }

    #[test]
    fn test_remove_children_keeps_excluded_and_root() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Library");
        write_file(&dir.join("a.txt"), "a");
        write_file(&dir.join("gone/b.txt"), "b");
        write_file(&dir.join("mixed/keep.lock"), "k");
        write_file(&dir.join("mixed/drop.txt"), "d");
        write_file(&dir.join("mixed/empty/drop.txt"), "d");

        remove_children(&dir, &excludes(&["keep.lock"])).unwrap();

        assert!(dir.is_dir());
        assert!(!dir.join("a.txt").exists());
        assert!(!dir.join("gone").exists());
        assert!(!dir.join("mixed/drop.txt").exists());
        assert!(!dir.join("mixed/empty").exists());
        assert_eq!(read_file(&dir.join("mixed/keep.lock")), "k");
    }

    #[test]
    fn test_remove_children_missing_dir_is_noop() {
        let temp = TempDir::new().unwrap();
        remove_children(&temp.path().join("missing"), &[]).unwrap();
    }

    #[test]
    fn test_dir_size_and_has_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        fs::create_dir_all(dir.join("empty")).unwrap();
        assert!(!has_files(&dir));

        write_file(&dir.join("x/y.bin"), "12345");
        write_file(&dir.join("z.bin"), "123");
        assert!(has_files(&dir));
        assert_eq!(dir_size(&dir, &[]), 8);
        assert_eq!(dir_size(&dir, &["d/x".to_string()]), 3);
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub/file.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(read_file(&path), "two");
        assert!(!temp.path().join("sub/file.json.tmp").exists());
    }
}
