//! Rendering diagnostics with miette
//!
//! [Report] wraps a [Diagnostic] and the file it points into so miette can print the source snippet.
use crate::diagnostic::{Diagnostic, Severity};
use crate::source::SourceFile;
use miette::{GraphicalReportHandler, GraphicalTheme, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;

pub struct Report<'a> {
    diagnostic: &'a Diagnostic,
    /// Only set when the diagnostic is located in this file
    source: Option<NamedSource<String>>,
}

impl<'a> Report<'a> {
    pub fn new(diagnostic: &'a Diagnostic, file: Option<&SourceFile>) -> Self {
        let source = file
            .filter(|file| {
                diagnostic
                    .range
                    .as_ref()
                    .is_some_and(|range| range.file() == file.path())
            })
            .map(|file| NamedSource::new(file.path().display().to_string(), file.text().to_string()));

        Self { diagnostic, source }
    }

    /// Plain text rendering, without colors
    pub fn render(&self) -> String {
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());

        let mut out = String::new();
        match handler.render_report(&mut out, self) {
            Ok(()) => out,
            Err(_) => self.diagnostic.to_string(),
        }
    }
}

impl fmt::Debug for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("diagnostic", &self.diagnostic)
            .finish()
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic.summary)
    }
}

impl std::error::Error for Report<'_> {}

impl miette::Diagnostic for Report<'_> {
    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.diagnostic.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let detail = &self.diagnostic.detail;
        if detail.is_empty() {
            return None;
        }
        Some(Box::new(detail) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source
            .as_ref()
            .map(|source| source as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.source.as_ref()?;
        let range = self.diagnostic.range.as_ref()?;

        let start = range.start.byte;
        let span = SourceSpan::new(start.into(), range.end.byte.saturating_sub(start));
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            None, span,
        ))))
    }
}
