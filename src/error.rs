use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Store failure inside any step; the surrounding transaction is rolled back.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}", labelled("Not found", .0))]
    NotFound(String),
    /// A superset reference that does not resolve inside its own workout, or a
    /// remap lookup that failed during a copy.
    #[error("{}", labelled("Consistency violation", .0))]
    ConsistencyViolation(String),
    #[error("{}", labelled("Invalid input", .0))]
    InvalidInput(String),
}

fn labelled(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_messages_start_on_next_line() {
        let err = AppError::InvalidInput("first\nsecond".to_string());
        assert_eq!(err.to_string(), "Invalid input:\nfirst\nsecond");
        let err = AppError::NotFound("workout id 4".to_string());
        assert_eq!(err.to_string(), "Not found: workout id 4");
    }
}
