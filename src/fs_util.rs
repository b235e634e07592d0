use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::IntakeError;

pub fn fs_err(context: impl std::fmt::Display, err: io::Error) -> IntakeError {
    IntakeError::Filesystem(format!("{context}: {err}"))
}

/// Lists the entries of `dir` sorted by name. A missing directory yields an empty list.
pub fn read_dir_sorted(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, IntakeError> {
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in dir
        .read_dir_utf8()
        .map_err(|err| fs_err(format!("read dir {dir}"), err))?
    {
        let entry = entry.map_err(|err| fs_err(format!("read dir {dir}"), err))?;
        entries.push(entry.into_path());
    }
    entries.sort();
    Ok(entries)
}

pub fn list_subdirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, IntakeError> {
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|path| path.as_std_path().is_dir())
        .collect())
}

/// Regular files directly under `dir` whose name satisfies `matches`, sorted by name.
pub fn list_files(
    dir: &Utf8Path,
    matches: impl Fn(&str) -> bool,
) -> Result<Vec<Utf8PathBuf>, IntakeError> {
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|path| path.as_std_path().is_file())
        .filter(|path| path.file_name().map(&matches).unwrap_or(false))
        .collect())
}

/// Files anywhere below `root` whose name satisfies `matches`.
pub fn find_files(
    root: &Utf8Path,
    matches: impl Fn(&str) -> bool,
) -> Result<Vec<Utf8PathBuf>, IntakeError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        for entry in read_dir_sorted(&path)? {
            if entry.as_std_path().is_dir() {
                stack.push(entry);
            } else if entry.file_name().map(&matches).unwrap_or(false) {
                out.push(entry);
            }
        }
    }
    out.sort();
    Ok(out)
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), IntakeError> {
    let parent = path
        .parent()
        .ok_or_else(|| IntakeError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent).map_err(|err| fs_err(format!("create {parent}"), err))?;
    let temp = Builder::new()
        .prefix(".fc-intake")
        .tempfile_in(parent)
        .map_err(|err| fs_err(format!("temp file in {parent}"), err))?;
    fs::write(temp.path(), content).map_err(|err| fs_err(format!("write {path}"), err))?;
    temp.persist(path)
        .map_err(|err| fs_err(format!("persist {path}"), err.error))?;
    Ok(())
}

/// Moves a file or directory. Across filesystems the data is copied next to `dest` and
/// renamed into place, so `dest` never holds a partial copy.
pub fn move_path(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IntakeError> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    if source.as_std_path().is_dir() {
        copy_dir_atomic(source, dest)?;
        fs::remove_dir_all(source).map_err(|err| fs_err(format!("remove {source}"), err))?;
    } else {
        copy_file_atomic(source, dest)?;
        fs::remove_file(source).map_err(|err| fs_err(format!("remove {source}"), err))?;
    }
    Ok(())
}

fn destination_parent(dest: &Utf8Path) -> Result<&Utf8Path, IntakeError> {
    let parent = dest
        .parent()
        .ok_or_else(|| IntakeError::Filesystem(format!("invalid destination path {dest}")))?;
    fs::create_dir_all(parent).map_err(|err| fs_err(format!("create {parent}"), err))?;
    Ok(parent)
}

/// Copies `source` into a temp directory beside `dest`, then renames it to `dest`.
/// On failure the temp directory is dropped and `dest` is left untouched.
pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IntakeError> {
    let parent = destination_parent(dest)?;
    let temp = Builder::new()
        .prefix(".fc-intake-copy")
        .tempdir_in(parent)
        .map_err(|err| fs_err(format!("temp dir in {parent}"), err))?;
    let staged = Utf8Path::from_path(temp.path())
        .ok_or_else(|| IntakeError::Filesystem(format!("non UTF-8 temp dir in {parent}")))?;
    copy_dir_recursive(source, staged)?;
    fs::rename(staged, dest).map_err(|err| fs_err(format!("rename {staged} to {dest}"), err))?;
    Ok(())
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IntakeError> {
    let parent = destination_parent(dest)?;
    let temp = Builder::new()
        .prefix(".fc-intake-copy")
        .tempfile_in(parent)
        .map_err(|err| fs_err(format!("temp file in {parent}"), err))?;
    fs::copy(source, temp.path())
        .map_err(|err| fs_err(format!("copy {source} to {dest}"), err))?;
    temp.persist(dest)
        .map_err(|err| fs_err(format!("persist {dest}"), err.error))?;
    Ok(())
}

pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IntakeError> {
    fs::create_dir_all(dest).map_err(|err| fs_err(format!("create {dest}"), err))?;
    for entry in read_dir_sorted(source)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = dest.join(name);
        if entry.as_std_path().is_dir() {
            copy_dir_recursive(&entry, &target)?;
        } else {
            fs::copy(&entry, &target)
                .map_err(|err| fs_err(format!("copy {entry} to {target}"), err))?;
        }
    }
    Ok(())
}

/// Removes `dir` and its subdirectories bottom-up as long as they hold no files.
/// Returns whether `dir` itself was removed.
pub fn remove_empty_tree(dir: &Utf8Path) -> Result<bool, IntakeError> {
    if !dir.as_std_path().is_dir() {
        return Ok(false);
    }
    let mut empty = true;
    for entry in read_dir_sorted(dir)? {
        if entry.as_std_path().is_dir() {
            if !remove_empty_tree(&entry)? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if !empty {
        return Ok(false);
    }
    fs::remove_dir(dir).map_err(|err| fs_err(format!("remove {dir}"), err))?;
    Ok(true)
}
