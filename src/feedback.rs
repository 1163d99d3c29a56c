//! User-facing notices collected while a request runs.
//!
//! Validation problems are not errors: the request finishes with empty or
//! partial output and the notices explain why.  Every notice is also logged.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Notice {
    Info(String),
    Warning(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(m) | Notice::Warning(m) => m,
        }
    }
}

/// Accumulates [`Notice`]s for one request.
#[derive(Debug, Default)]
pub struct Feedback {
    notices: Vec<Notice>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.notices.push(Notice::Info(message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.notices.push(Notice::Warning(message));
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.notices.iter().filter_map(|n| match n {
            Notice::Warning(m) => Some(m.as_str()),
            Notice::Info(_) => None,
        })
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn into_notices(self) -> Vec<Notice> {
        self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_filtered() {
        let mut fb = Feedback::new();
        fb.info("loading");
        fb.warn("missing audio");
        assert!(fb.has_warnings());
        assert_eq!(fb.warnings().collect::<Vec<_>>(), vec!["missing audio"]);
        assert_eq!(fb.notices().len(), 2);
    }

    #[test]
    fn test_notice_serializes_with_level() {
        let json = serde_json::to_string(&Notice::Warning("x".into())).unwrap();
        assert_eq!(json, r#"{"level":"warning","message":"x"}"#);
    }
}
