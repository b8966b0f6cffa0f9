use std::ffi::OsString;
use std::path::PathBuf;

pub const APP_ID: &str = "com.browser.shell";
/// Overrides the data directory (tests, portable installs).
pub const DATA_DIR_ENV: &str = "BROWSER_BACKEND_DATA_DIR";

const DATABASE_FILE: &str = "database.json";
const FAVICON_DIR: &str = "favicon";
const LOG_DIR: &str = "logs";

/// On-disk layout under one application data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
}

impl Paths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn from_env() -> Self {
        Self::new(resolve_data_dir(std::env::var_os(DATA_DIR_ENV)))
    }

    pub fn database(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn favicon_dir(&self) -> PathBuf {
        self.data_dir.join(FAVICON_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR)
    }
}

fn resolve_data_dir(env_override: Option<OsString>) -> PathBuf {
    match env_override.filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_ID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_and_empty_is_ignored() {
        assert_eq!(resolve_data_dir(Some("/tmp/shell".into())), PathBuf::from("/tmp/shell"));
        assert!(resolve_data_dir(Some(OsString::new())).ends_with(APP_ID));
        assert!(resolve_data_dir(None).ends_with(APP_ID));
    }

    #[test]
    fn layout_is_siblings() {
        let paths = Paths::new("/data");
        assert_eq!(paths.database(), PathBuf::from("/data/database.json"));
        assert_eq!(paths.favicon_dir(), PathBuf::from("/data/favicon"));
        assert_eq!(paths.log_dir(), PathBuf::from("/data/logs"));
    }
}
