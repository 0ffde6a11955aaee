use std::path::PathBuf;

const APP_DIR: &str = "vinyl-dash";

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

/// Where the log file lives.  XDG layout on every unix, macOS included.
pub fn data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    } else {
        home().join(".local").join("share").join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    } else {
        home().join(".config").join(APP_DIR)
    }
}

pub fn log_path() -> PathBuf {
    data_dir().join("vinyl-dash.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_dirs_are_app_scoped() {
        assert!(data_dir().ends_with(APP_DIR));
        assert!(config_dir().ends_with(APP_DIR));
        assert_eq!(log_path().parent(), Some(data_dir().as_path()));
    }
}
