//! Runtime abstraction for the process environment.
//!
//! Configuration loading goes through this trait so tests can feed config
//! files and environment variables without touching the real system.
//!
//! - `env` - `.env` loading
//! - `fs` - reading config files

mod env;
mod fs;

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment

    /// Load a `.env` file from the working directory (or a parent) into the
    /// process environment. Returns the file that was loaded, if any.
    fn load_dotenv(&self) -> Option<PathBuf>;

    // File System
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn exists(&self, path: &Path) -> bool;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn load_dotenv(&self) -> Option<PathBuf> {
        self.load_dotenv_impl()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }
}
