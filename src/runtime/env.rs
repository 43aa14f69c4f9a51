//! `.env` loading.

use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn load_dotenv_impl(&self) -> Option<PathBuf> {
        match dotenvy::dotenv() {
            Ok(path) => Some(path),
            Err(e) if e.not_found() => None,
            Err(e) => {
                // Logging is not up yet.
                eprintln!("Ignoring unreadable .env file: {}", e);
                None
            }
        }
    }
}

