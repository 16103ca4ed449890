use std::path::{Path, PathBuf};

use crate::config::ResultConfig;

/// Per-invocation state shared by the writer and the coverage filename helpers.
#[derive(Clone, Debug)]
pub struct Context {
    config: ResultConfig,
    output_obj: PathBuf,
    apparent_cwd: PathBuf,
}

impl Context {
    /// `output_obj` is the object path as given to the compiler (possibly
    /// relative); `apparent_cwd` is the working directory the compiler saw,
    /// which may differ from the canonical one when symlinks are involved.
    pub fn new(
        config: ResultConfig,
        output_obj: impl Into<PathBuf>,
        apparent_cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            output_obj: output_obj.into(),
            apparent_cwd: apparent_cwd.into(),
        }
    }

    /// Builds a context for the current process, preferring `$PWD` as the
    /// apparent working directory when it refers to the real one.
    pub fn for_current_dir(
        config: ResultConfig,
        output_obj: impl Into<PathBuf>,
    ) -> std::io::Result<Self> {
        let actual_cwd = std::env::current_dir()?;
        let apparent_cwd = std::env::var_os("PWD")
            .map(PathBuf::from)
            .filter(|pwd| same_directory(pwd, &actual_cwd))
            .unwrap_or(actual_cwd);
        Ok(Self::new(config, output_obj, apparent_cwd))
    }

    pub fn config(&self) -> &ResultConfig {
        &self.config
    }

    pub fn output_obj(&self) -> &Path {
        &self.output_obj
    }

    pub fn apparent_cwd(&self) -> &Path {
        &self.apparent_cwd
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    if !a.is_absolute() {
        return false;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
