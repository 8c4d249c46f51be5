use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoxdeskError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, BoxdeskError>;

impl From<serde_json::Error> for BoxdeskError {
    fn from(err: serde_json::Error) -> Self {
        BoxdeskError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BoxdeskError {
    fn from(err: reqwest::Error) -> Self {
        BoxdeskError::Http(err.to_string())
    }
}

impl From<diesel::result::Error> for BoxdeskError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => BoxdeskError::NotFound("row not found".to_string()),
            other => BoxdeskError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = BoxdeskError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));
        let err = BoxdeskError::InvalidInput("bad hour".to_string());
        assert_eq!(err.to_string(), "invalid input: bad hour");
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: BoxdeskError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, BoxdeskError::NotFound(_)));
    }
}
