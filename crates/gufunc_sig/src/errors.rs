use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Malformed dimension signature text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid gufunc signature {source_text:?}: {message}")]
pub struct SignatureParseError {
    source_text: String,
    span: Range<usize>,
    message: String,
}

impl SignatureParseError {
    pub fn new(source_text: &str, span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            source_text: source_text.to_string(),
            span,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// The slice of the signature the error points at. Empty at end of input.
    pub fn offending(&self) -> &str {
        let len = self.source_text.len();
        let start = self.span.start.min(len);
        let end = self.span.end.clamp(start, len);
        self.source_text.get(start..end).unwrap_or("")
    }

    /// Render the error as a plain-text diagnostic with the span underlined.
    pub fn render(&self) -> String {
        let id = "signature".to_string();
        let len = self.source_text.len();
        let start = self.span.start.min(len);
        let span = start..self.span.end.clamp(start, len.max(start));

        let report = Report::build(ReportKind::Error, id.clone(), span.start)
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new((id.clone(), span)).with_message(&self.message))
            .finish();

        let mut buffer = Vec::new();
        if report
            .write((id, Source::from(self.source_text.as_str())), &mut buffer)
            .is_err()
        {
            return self.to_string();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offending_clamps_to_source() {
        let err = SignatureParseError::new("(n)", 3..4, "unexpected end of signature");
        assert_eq!(err.offending(), "");
    }

    #[test]
    fn render_mentions_message() {
        let err = SignatureParseError::new("(n;m)->(n)", 2..3, "unexpected character ';'");
        let rendered = err.render();
        assert!(rendered.contains("unexpected character ';'"), "{rendered}");
    }
}
