use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use crate::core::sys::{LV2_STATE_ERR_NO_FEATURE, LV2_STATE_ERR_UNKNOWN, LV2_State_Status};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    MissingFeature,
    PathRequest,
    Io,
    Host,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    feature: Option<&'static str>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            feature: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn feature(&self) -> Option<&'static str> {
        self.feature
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_feature(mut self, uri: &'static str) -> Self {
        self.feature = Some(uri);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(feature) = self.feature {
            write!(f, " (feature: {feature})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_state_status(kind: ErrorKind) -> LV2_State_Status {
    match kind {
        ErrorKind::MissingFeature => LV2_STATE_ERR_NO_FEATURE,
        ErrorKind::Internal
        | ErrorKind::Usage
        | ErrorKind::PathRequest
        | ErrorKind::Io
        | ErrorKind::Host => LV2_STATE_ERR_UNKNOWN,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::MissingFeature => 3,
        ErrorKind::PathRequest => 4,
        ErrorKind::Io => 5,
        ErrorKind::Host => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code, to_state_status};
    use crate::core::sys::{LV2_STATE__makePath, LV2_STATE_ERR_NO_FEATURE, LV2_STATE_ERR_UNKNOWN};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::MissingFeature, 3),
            (ErrorKind::PathRequest, 4),
            (ErrorKind::Io, 5),
            (ErrorKind::Host, 6),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn only_missing_feature_maps_to_no_feature_status() {
        assert_eq!(
            to_state_status(ErrorKind::MissingFeature),
            LV2_STATE_ERR_NO_FEATURE
        );
        for kind in [
            ErrorKind::Internal,
            ErrorKind::Usage,
            ErrorKind::PathRequest,
            ErrorKind::Io,
            ErrorKind::Host,
        ] {
            assert_eq!(to_state_status(kind), LV2_STATE_ERR_UNKNOWN);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::MissingFeature)
            .with_message("host does not have makePath")
            .with_feature(LV2_STATE__makePath)
            .with_path("/tmp/state");
        let text = err.to_string();
        assert!(text.starts_with("MissingFeature: host does not have makePath"));
        assert!(text.contains("(path: /tmp/state)"));
        assert!(text.contains("(feature: http://lv2plug.in/ns/ext/state#makePath)"));
    }
}
