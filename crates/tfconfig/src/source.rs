//! loading source files into [Document]s
//!
//! A [LoadSession] is the parser adapter for one configuration load. It
//! - selects native or JSON syntax by filename ([Syntax::for_path])
//! - interns the text of every loaded file so positions can be resolved and rendered later
//! - hands out [Document]s which keep a reference to their interned [SourceFile]
//!
//! All files of one configuration should be loaded through the same session.
use crate::diagnostic::{Diagnostic, Diagnostics, Pos, SourceRange};
use crate::json::{Origins, Translation};
use crate::report::Report;
use hcl_edit::structure::Body;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Native,
    Json,
}

impl Syntax {
    pub fn for_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext == "json" => Syntax::Json,
            _ => Syntax::Native,
        }
    }
}

/// Text of a loaded file plus a line table to resolve byte offsets
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();

        Self {
            path: path.into(),
            text,
            line_starts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Resolve a byte offset; offsets past the end are clamped
    pub fn position(&self, offset: usize) -> Pos {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }

        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line_index];
        let column = self.text[line_start..offset].chars().count() + 1;

        Pos::new(line_index + 1, column, offset)
    }

    /// Resolve a 1-based line and column as reported by a parser
    pub fn position_at(&self, line: usize, column: usize) -> Pos {
        let Some(line_start) = line
            .checked_sub(1)
            .and_then(|index| self.line_starts.get(index))
            .copied()
        else {
            return self.position(self.text.len());
        };

        let byte = self.text[line_start..]
            .char_indices()
            .nth(column.saturating_sub(1))
            .map(|(idx, _)| line_start + idx)
            .unwrap_or(self.text.len());

        self.position(byte)
    }

    pub fn range(&self, span: Range<usize>) -> SourceRange {
        SourceRange::new(
            self.path.clone(),
            self.position(span.start),
            self.position(span.end),
        )
    }

    /// Like [SourceFile::range], falling back to the start of the file for nodes without a span
    pub fn range_or_start(&self, span: Option<Range<usize>>) -> SourceRange {
        self.range(span.unwrap_or(0..0))
    }
}

/// A parsed body paired with the file it was read from
///
/// Spans inside the body are only meaningful for [Syntax::Native]. JSON documents are translated first and locate
/// their structures through [Document::origins].
#[derive(Debug, Clone)]
pub struct Document {
    body: Body,
    source: Arc<SourceFile>,
    syntax: Syntax,
    origins: Option<Origins>,
    diagnostics: Diagnostics,
}

impl Document {
    pub fn new(body: Body, source: Arc<SourceFile>, syntax: Syntax) -> Self {
        Self {
            body,
            source,
            syntax,
            origins: None,
            diagnostics: Diagnostics::new(),
        }
    }

    fn from_json(translation: Translation, source: Arc<SourceFile>) -> Self {
        Self {
            body: translation.body,
            source,
            syntax: Syntax::Json,
            origins: Some(translation.origins),
            diagnostics: translation.diagnostics,
        }
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn filename(&self) -> &Path {
        self.source.path()
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    /// Where the structures of a JSON document were read from
    pub fn origins(&self) -> Option<&Origins> {
        self.origins.as_ref()
    }

    /// Problems found while loading that did not prevent a body, they lead the decode diagnostics
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Decode into a [crate::config::Config], see [crate::lower::decode]
    pub fn decode(&self) -> crate::lower::Decoded {
        crate::lower::decode(self)
    }
}

#[derive(Debug, Default)]
pub struct LoadSession {
    files: Vec<Arc<SourceFile>>,
}

impl LoadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Document, LoadError> {
        let path = path.as_ref();
        tracing::info!(path=%path.display(), "loading file");

        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;

        self.load_str(path, text)
    }

    /// Parse text as if it was read from `path`
    pub fn load_str(
        &mut self,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> Result<Document, LoadError> {
        let source = Arc::new(SourceFile::new(path, text));
        self.files.push(Arc::clone(&source));

        let syntax = Syntax::for_path(source.path());
        tracing::debug!(path=%source.path().display(), ?syntax, "parsing");

        match syntax {
            Syntax::Native => Ok(Document::new(parse_native(&source)?, source, syntax)),
            Syntax::Json => {
                let translation = crate::json::parse_body(&source).map_err(LoadError::Syntax)?;
                Ok(Document::from_json(translation, source))
            }
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter().map(AsRef::as_ref)
    }

    /// Most recently loaded file with the given path
    pub fn source(&self, path: &Path) -> Option<&SourceFile> {
        self.files
            .iter()
            .rev()
            .find(|file| file.path() == path)
            .map(AsRef::as_ref)
    }

    /// Render a diagnostic together with the source it points at
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let source = diagnostic
            .range
            .as_ref()
            .and_then(|range| self.source(range.file()));

        Report::new(diagnostic, source).render()
    }
}

fn parse_native(source: &SourceFile) -> Result<Body, LoadError> {
    hcl_edit::parser::parse_body(source.text()).map_err(|err| {
        let location = err.location();
        let start = source.position_at(location.line(), location.column());
        let range = SourceRange::new(source.path().to_owned(), start, start);

        LoadError::Syntax(
            Diagnostic::error("Invalid syntax", err.message().to_string())
                .with_range(range)
                .into(),
        )
    })
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Syntax(Diagnostics),
}

impl LoadError {
    /// The syntax diagnostics, if this is not an I/O failure
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            LoadError::Syntax(diags) => Some(diags),
            LoadError::Io { .. } => None,
        }
    }
}

/// Utility macro to load a [Document] from text with a fresh [LoadSession]
///
/// ```
/// # use tfconfig::document;
/// let doc = document!("main.tf" => r#"variable "region" {}"#);
/// assert_eq!(doc.filename(), std::path::Path::new("main.tf"));
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tfconfig::document;
/// document!("main.tf" => "not = valid = hcl");
/// ```
#[macro_export]
macro_rules! document {
    { $source:expr => $text:expr } => {
        $crate::source::LoadSession::new()
            .load_str($source, $text)
            .expect("document must parse")
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn syntax_by_suffix() {
        assert_eq!(Syntax::for_path(Path::new("main.tf")), Syntax::Native);
        assert_eq!(Syntax::for_path(Path::new("main.tf.json")), Syntax::Json);
        assert_eq!(Syntax::for_path(Path::new("json")), Syntax::Native);
    }

    #[test]
    fn positions() {
        let file = SourceFile::new("main.tf", "a = 1\nbé = 2\n");

        assert_eq!(file.position(0), Pos::new(1, 1, 0));
        assert_eq!(file.position(6), Pos::new(2, 1, 6));
        // byte 9 is after the two byte 'é'
        assert_eq!(file.position(9), Pos::new(2, 3, 9));
        assert_eq!(file.position(1000), Pos::new(3, 1, 14));
        assert_eq!(file.position_at(2, 3), Pos::new(2, 3, 9));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LoadSession::new()
            .load_file("does/not/exist.tf")
            .expect_err("must fail");

        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.diagnostics().is_none());
    }

    #[test]
    fn syntax_error_is_located_in_file() {
        let mut session = LoadSession::new();
        let err = session
            .load_str("broken.tf", "resource \"x\" \"y\" {\n  count = \n")
            .expect_err("must fail");

        let diags = err.diagnostics().expect("syntax diagnostics");
        assert!(diags.has_errors());
        for diag in diags {
            let range = diag.range.as_ref().expect("range");
            assert_eq!(range.file(), Path::new("broken.tf"));
            assert!(range.start.line <= 3);
        }
    }

    #[test]
    fn session_interns_every_file() {
        let mut session = LoadSession::new();
        session.load_str("a.tf", "").expect("parse");
        session.load_str("b.tf.json", "{}").expect("parse");

        let paths: Vec<_> = session.files().map(SourceFile::path).collect();
        assert_eq!(paths, vec![Path::new("a.tf"), Path::new("b.tf.json")]);
    }
}
