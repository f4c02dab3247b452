use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeeTapError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command rule matched but its numeric parameters did not parse.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The step classifier's response was not valid structured data.
    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Element not found: {0}")]
    Resolution(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("Timed out after {0}s: {1}")]
    Timeout(u64, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl SeeTapError {
    /// Errors that end the whole run rather than a single instruction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SeeTapError::Session(_)
                | SeeTapError::Capture(_)
                | SeeTapError::Config(_)
                | SeeTapError::Bootstrap(_)
        )
    }
}

impl serde::Serialize for SeeTapError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type SeeTapResult<T> = Result<T, SeeTapError>;

/// Bound a collaborator call with a timeout, mapping expiry to `SeeTapError::Timeout`.
pub async fn with_timeout<T, F>(secs: u64, what: &str, fut: F) -> SeeTapResult<T>
where
    F: std::future::Future<Output = SeeTapResult<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(secs), fut).await {
        Ok(res) => res,
        Err(_) => Err(SeeTapError::Timeout(secs, what.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_session_level() {
        assert!(SeeTapError::Session("gone".into()).is_fatal());
        assert!(SeeTapError::Capture("no device".into()).is_fatal());
        assert!(!SeeTapError::Parse("x".into()).is_fatal());
        assert!(!SeeTapError::Classification("x".into()).is_fatal());
    }

    #[tokio::test]
    async fn timeout_maps_to_error() {
        let res: SeeTapResult<()> = with_timeout(0, "sleepy", async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(SeeTapError::Timeout(0, _))));
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&SeeTapError::Action("boom".into())).unwrap();
        assert_eq!(json, "\"Action failed: boom\"");
    }
}
