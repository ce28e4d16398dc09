use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlayhubError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("voice error: {0}")]
    Voice(String),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("voice.speaking_threshold = 2 is out of range".into());
        assert_eq!(
            err.to_string(),
            "config validation error: voice.speaking_threshold = 2 is out of range"
        );
    }

    #[test]
    fn playhub_error_from_config() {
        let err: PlayhubError = ConfigError::ParseError("bad toml".into()).into();
        assert!(matches!(err, PlayhubError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn playhub_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin closed");
        let err: PlayhubError = io_err.into();
        assert!(matches!(err, PlayhubError::Io(_)));
        assert!(err.to_string().contains("stdin closed"));
    }

    #[test]
    fn playhub_error_domain_variants() {
        assert_eq!(
            PlayhubError::Signaling("handshake refused".into()).to_string(),
            "signaling error: handshake refused"
        );
        assert_eq!(
            PlayhubError::Voice("microphone unavailable".into()).to_string(),
            "voice error: microphone unavailable"
        );
        assert_eq!(
            PlayhubError::Chat("not joined".into()).to_string(),
            "chat error: not joined"
        );
        assert_eq!(PlayhubError::Other("boom".into()).to_string(), "boom");
    }
}
