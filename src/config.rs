use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const DB_ENV: &str = "GYMLOG_DB";
pub const SESSION_ENV: &str = "GYMLOG_SESSION";
pub const DEFAULT_SESSION_ID: &str = "default";

/// Settings resolved from global flags, their environment fallbacks and
/// `$HOME`.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub session_id: String,
    pub verbose: bool,
}

impl Config {
    pub fn resolve(
        db_path: Option<PathBuf>,
        session_id: Option<String>,
        verbose: bool,
    ) -> Result<Self, AppError> {
        let db_path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };
        let db_path = absolutize(&db_path)?;
        let session_id = resolve_session_id(session_id)?;
        Ok(Self {
            db_path,
            session_id,
            verbose,
        })
    }
}

fn default_db_path() -> Result<PathBuf, AppError> {
    let home = std::env::var("HOME").map_err(|_| {
        AppError::InvalidInput(format!(
            "unable to resolve a database path; pass --db or set {DB_ENV}"
        ))
    })?;
    Ok(PathBuf::from(home).join(".gymlog").join("gymlog.db"))
}

// `Url::from_file_path` only accepts absolute paths.
fn absolutize(path: &Path) -> Result<PathBuf, AppError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(AppError::InvalidInput("--db is empty".to_string()));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn resolve_session_id(session_id: Option<String>) -> Result<String, AppError> {
    let Some(value) = session_id else {
        return Ok(DEFAULT_SESSION_ID.to_string());
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("--session-id is empty".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_db_path_is_kept() {
        let config = Config::resolve(Some(PathBuf::from("/tmp/x/gym.db")), None, false)
            .expect("resolve");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x/gym.db"));
        assert_eq!(config.session_id, DEFAULT_SESSION_ID);
    }

    #[test]
    fn relative_db_path_is_made_absolute() {
        let config =
            Config::resolve(Some(PathBuf::from("gym.db")), None, false).expect("resolve");
        assert!(config.db_path.is_absolute());
        assert!(config.db_path.ends_with("gym.db"));
    }

    #[test]
    fn session_id_is_trimmed_and_must_not_be_blank() {
        let config = Config::resolve(
            Some(PathBuf::from("/tmp/gym.db")),
            Some("  phone  ".to_string()),
            false,
        )
        .expect("resolve");
        assert_eq!(config.session_id, "phone");

        let err = Config::resolve(Some(PathBuf::from("/tmp/gym.db")), Some(" ".to_string()), false)
            .expect_err("blank session");
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
