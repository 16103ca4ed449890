use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target = "objcache.result",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove file"
            );
            false
        }
    }
}

/// Places the contents of `src` at `dest`, replacing any existing file.
///
/// With `hard_link` set, a hard link is tried first; if that fails (e.g.
/// across filesystems) the file is copied. Copies go through a temporary file
/// in the destination directory so `dest` never holds a partial copy.
pub(crate) fn hard_link_or_copy(src: &Path, dest: &Path, hard_link: bool) -> io::Result<()> {
    if hard_link {
        remove_file_best_effort(dest, "hard_link_or_copy.replace");
        match fs::hard_link(src, dest) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::debug!(
                    target = "objcache.result",
                    src = %src.display(),
                    dest = %dest.display(),
                    error = %err,
                    "hard link failed; falling back to copy"
                );
            }
        }
    }

    copy_via_tmp_file(src, dest)
}

fn copy_via_tmp_file(src: &Path, dest: &Path) -> io::Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let (tmp_path, file) = open_unique_tmp_file(dest, parent)?;
    drop(file);

    let result = fs::copy(src, &tmp_path).and_then(|_| fs::rename(&tmp_path, dest));
    if result.is_err() {
        remove_file_best_effort(&tmp_path, "copy_via_tmp_file.failed");
    }
    result
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
