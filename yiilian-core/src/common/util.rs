use std::path::{Path, PathBuf};

use crate::common::error::Error;

/// Init log4rs with the given yaml file.
pub fn setup_log4rs_from_file<P: AsRef<Path>>(file_path: P) -> Result<(), Error> {
    log4rs::init_file(file_path.as_ref(), Default::default()).map_err(|error| {
        Error::new_config(
            Some(error.into()),
            Some(format!(
                "init log4rs from {} failed",
                file_path.as_ref().display()
            )),
        )
    })
}

/// Init logging from `log4rs.yml` if it can be found, otherwise fall back to env_logger
/// (`RUST_LOG` controls the level).
pub fn setup_log(log4rs_entry: &str) {
    if let Some(path) = find_entry(log4rs_entry) {
        if setup_log4rs_from_file(&path).is_ok() {
            return;
        }
    }

    env_logger::try_init().ok();
}

/// Search the entry from the directory of the executable up to the root, then the current dir.
pub fn find_entry(entry: &str) -> Option<PathBuf> {
    let mut search_dirs: Vec<PathBuf> = vec![];

    if let Ok(exec) = std::env::current_exe() {
        let mut dir = exec.parent().map(|v| v.to_owned());
        while let Some(path) = dir {
            dir = path.parent().map(|v| v.to_owned());
            search_dirs.push(path);
        }
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if !search_dirs.contains(&current_dir) {
            search_dirs.push(current_dir);
        }
    }

    search_dirs
        .into_iter()
        .map(|dir| dir.join(entry))
        .find(|path| path.exists())
}

/// `~/{entry}`
pub fn home_entry(entry: &str) -> Result<PathBuf, Error> {
    home::home_dir()
        .map(|home| home.join(entry))
        .ok_or_else(|| Error::new_config(None, Some("can't get the home dir".to_owned())))
}

/// Parse a decimal string as u64, `None` for anything else.
pub fn parse_u64(data: &str) -> Option<u64> {
    if data.is_empty() || !data.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    data.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64() {
        assert_eq!(Some(0), parse_u64("0"));
        assert_eq!(Some(1024), parse_u64("1024"));
        assert_eq!(None, parse_u64(""));
        assert_eq!(None, parse_u64("-1"));
        assert_eq!(None, parse_u64("+1"));
        assert_eq!(None, parse_u64("abc"));
        assert_eq!(None, parse_u64("99999999999999999999999"));
    }

    #[test]
    fn test_find_entry() {
        let dir = std::env::current_dir().unwrap();
        let entry = "Cargo.toml";

        if dir.join(entry).exists() {
            assert!(find_entry(entry).is_some());
        }

        assert_eq!(None, find_entry("__no_such_entry_for_yiilian__"));
    }

    #[test]
    fn test_setup_log4rs_missing_file() {
        let rst = setup_log4rs_from_file("__no_such_log4rs__.yml");
        assert!(rst.is_err());
    }
}
