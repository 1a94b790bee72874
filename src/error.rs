use std::fmt;

#[derive(Debug)]
pub enum DeckError {
    /// A card names an image or keeper the provider cannot resolve.
    UnresolvedReference { kind: &'static str, name: String },
    InvalidConfiguration(String),
    Asset(String),
    Io(std::io::Error),
}

impl DeckError {
    pub(crate) fn unresolved(kind: &'static str, name: impl Into<String>) -> Self {
        DeckError::UnresolvedReference {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for DeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckError::UnresolvedReference { kind, name } => {
                write!(f, "unknown {} \"{}\"", kind, name)
            }
            DeckError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            DeckError::Asset(message) => write!(f, "asset error: {}", message),
            DeckError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for DeckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeckError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DeckError {
    fn from(value: std::io::Error) -> Self {
        DeckError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_names_the_identifier() {
        let err = DeckError::unresolved("keeper", "pano");
        assert_eq!(err.to_string(), "unknown keeper \"pano\"");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: DeckError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
