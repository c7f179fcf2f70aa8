//! first decode pass: check a body against the block grammar
//!
//! [decode] walks a [Document] body against [schema::TOP_LEVEL] and produces grammar-shaped structures
//! ([TopLevel] and friends). Nothing here knows about domain rules, it only checks
//! - labels (count)
//! - attributes (required, allowed, primitive kind)
//! - nested blocks (allowed, repetition)
//!
//! and reports one [Diagnostic] per violation. Whatever a block does not consume is kept as a [Remainder] for a
//! later, more specific decode.
use crate::diagnostic::{Diagnostic, Diagnostics, SourceRange};
use crate::schema::{self, AttributeSchema, BlockSchema, Remain, Repeat, ValueKind};
use crate::json::{Origin, Origins};
use crate::source::{Document, SourceFile};
use hcl::template::Element;
use hcl::Template;
use hcl_edit::repr::Span;
use hcl_edit::structure::{Attribute, Block, BlockLabel, Body, Structure};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Decode the body of `document` into grammar-shaped structures
///
/// The returned structures are best effort when the diagnostics contain errors.
#[tracing::instrument(level = "debug", skip_all, fields(file=%document.filename().display()))]
pub fn decode(document: &Document) -> (TopLevel, Diagnostics) {
    let source = document.source();
    // problems found while loading a JSON document come first
    let mut diags = document.diagnostics().clone();

    let range = source.range(0..source.text().len());
    let content = Decoder::new(source, document.origins(), &mut diags).body(
        &schema::TOP_LEVEL,
        document.body(),
        range,
        vec![],
    );

    tracing::debug!(issues = diags.len(), "shallow decode done");
    (TopLevel::from_content(content), diags)
}

/// A value together with the range it was read from
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Spanned<T> {
    pub value: T,
    pub range: SourceRange,
}

pub type Label = Spanned<String>;

/// Unconsumed part of a block body
///
/// Owns the attributes and blocks the schema of its block did not name, together with the file they came from.
/// It is never decoded here; whoever consumes it applies its own schema.
#[derive(Debug, Clone)]
pub struct Remainder {
    body: Body,
    source: Arc<SourceFile>,
}

impl Remainder {
    pub fn new(body: Body, source: Arc<SourceFile>) -> Self {
        Self { body, source }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    pub fn filename(&self) -> &Path {
        self.source.path()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().next().is_none()
    }

    /// Keys of the forwarded attributes
    pub fn attribute_keys(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|structure| match structure {
            Structure::Attribute(attr) => Some(attr.key.value().as_str()),
            Structure::Block(_) => None,
        })
    }

    /// Identifiers of the forwarded blocks
    pub fn block_idents(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|structure| match structure {
            Structure::Block(block) => Some(block.ident.value().as_str()),
            Structure::Attribute(_) => None,
        })
    }
}

// FIXME: compares the rendered body, hcl_edit bodies carry decor and spans
impl PartialEq for Remainder {
    fn eq(&self, other: &Self) -> bool {
        self.filename() == other.filename() && self.body.to_string() == other.body.to_string()
    }
}

impl Serialize for Remainder {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.body)
    }
}

#[derive(Debug, Default)]
pub struct TopLevel {
    pub atlas: Option<Atlas>,
    pub datas: Vec<Resource>,
    pub modules: Vec<Module>,
    pub outputs: Vec<Output>,
    pub providers: Vec<Provider>,
    pub resources: Vec<Resource>,
    pub terraform: Option<Terraform>,
    pub variables: Vec<Variable>,
    pub locals: Vec<Locals>,
}

#[derive(Debug)]
pub struct Terraform {
    pub range: SourceRange,
    pub required_version: Option<String>,
    pub backend: Option<Backend>,
}

#[derive(Debug)]
pub struct Backend {
    pub range: SourceRange,
    pub r#type: Label,
    pub config: Remainder,
}

#[derive(Debug)]
pub struct Atlas {
    pub range: SourceRange,
    pub name: String,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct Module {
    pub range: SourceRange,
    pub name: Label,
    pub source: String,
    pub config: Remainder,
}

#[derive(Debug)]
pub struct Provider {
    pub range: SourceRange,
    pub name: Label,
    pub alias: Option<String>,
    pub version: Option<String>,
    pub config: Remainder,
}

#[derive(Debug)]
pub struct Lifecycle {
    pub create_before_destroy: Option<bool>,
    pub prevent_destroy: Option<bool>,
    pub ignore_changes: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct Connection {
    pub config: Remainder,
}

#[derive(Debug)]
pub struct Provisioner {
    pub r#type: Label,
    pub when: Option<Spanned<String>>,
    pub on_failure: Option<Spanned<String>>,
    pub connection: Option<Connection>,
    pub config: Remainder,
}

/// Shape shared by `resource` and `data` blocks
#[derive(Debug)]
pub struct Resource {
    pub range: SourceRange,
    pub r#type: Label,
    pub name: Label,
    pub count: Option<hcl::Expression>,
    pub provider: Option<String>,
    pub depends_on: Option<Vec<String>>,
    pub lifecycle: Option<Lifecycle>,
    pub provisioners: Vec<Provisioner>,
    pub config: Remainder,
}

#[derive(Debug)]
pub struct Variable {
    pub range: SourceRange,
    pub name: Label,
    pub declared_type: Option<String>,
    pub default: Option<Spanned<hcl::Expression>>,
    pub description: Option<String>,
    pub sensitive: Option<bool>,
}

#[derive(Debug)]
pub struct Output {
    pub range: SourceRange,
    pub name: Label,
    pub value: hcl::Expression,
    pub depends_on: Option<Vec<String>>,
    pub description: Option<String>,
    pub sensitive: Option<bool>,
}

#[derive(Debug)]
pub struct Locals {
    pub definitions: Vec<Definition>,
}

/// A single `name = expression` inside a `locals` block
#[derive(Debug)]
pub struct Definition {
    pub range: SourceRange,
    pub name: String,
    pub expr: hcl::Expression,
}

/// Structures built from a decoded [Content]
trait FromContent {
    fn from_content(content: Content) -> Self;
}

impl FromContent for TopLevel {
    fn from_content(mut content: Content) -> Self {
        Self {
            atlas: content.block("atlas"),
            datas: content.blocks("data"),
            modules: content.blocks("module"),
            outputs: content.blocks("output"),
            providers: content.blocks("provider"),
            resources: content.blocks("resource"),
            terraform: content.block("terraform"),
            variables: content.blocks("variable"),
            locals: content.blocks("locals"),
        }
    }
}

impl FromContent for Terraform {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            required_version: content.string("required_version"),
            backend: content.block("backend"),
        }
    }
}

impl FromContent for Backend {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            r#type: content.label(0),
            config: content.remainder(),
        }
    }
}

impl FromContent for Atlas {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            name: content.string("name").unwrap_or_default(),
            include: content.strings("include"),
            exclude: content.strings("exclude"),
        }
    }
}

impl FromContent for Module {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            name: content.label(0),
            source: content.string("source").unwrap_or_default(),
            config: content.remainder(),
        }
    }
}

impl FromContent for Provider {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            name: content.label(0),
            alias: content.string("alias"),
            version: content.string("version"),
            config: content.remainder(),
        }
    }
}

impl FromContent for Lifecycle {
    fn from_content(mut content: Content) -> Self {
        Self {
            create_before_destroy: content.bool("create_before_destroy"),
            prevent_destroy: content.bool("prevent_destroy"),
            ignore_changes: content.strings("ignore_changes"),
        }
    }
}

impl FromContent for Connection {
    fn from_content(mut content: Content) -> Self {
        Self {
            config: content.remainder(),
        }
    }
}

impl FromContent for Provisioner {
    fn from_content(mut content: Content) -> Self {
        Self {
            r#type: content.label(0),
            when: content.spanned_string("when"),
            on_failure: content.spanned_string("on_failure"),
            connection: content.block("connection"),
            config: content.remainder(),
        }
    }
}

impl FromContent for Resource {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            r#type: content.label(0),
            name: content.label(1),
            count: content.expression("count").map(|expr| expr.value),
            provider: content.string("provider"),
            depends_on: content.strings("depends_on"),
            lifecycle: content.block("lifecycle"),
            provisioners: content.blocks("provisioner"),
            config: content.remainder(),
        }
    }
}

impl FromContent for Variable {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            name: content.label(0),
            declared_type: content.string("type"),
            default: content.expression("default"),
            description: content.string("description"),
            sensitive: content.bool("sensitive"),
        }
    }
}

impl FromContent for Output {
    fn from_content(mut content: Content) -> Self {
        Self {
            range: content.range.clone(),
            name: content.label(0),
            value: content
                .expression("value")
                .map(|expr| expr.value)
                .unwrap_or(hcl::Expression::Null),
            depends_on: content.strings("depends_on"),
            description: content.string("description"),
            sensitive: content.bool("sensitive"),
        }
    }
}

impl FromContent for Locals {
    fn from_content(mut content: Content) -> Self {
        Self {
            definitions: std::mem::take(&mut content.definitions),
        }
    }
}

#[derive(Debug)]
enum AttrValue {
    String(String),
    Bool(bool),
    StringList(Vec<String>),
    Expression(hcl::Expression),
}

/// Schema-checked content of one block body
///
/// Attributes in here already have the kind their schema asks for.
#[derive(Debug)]
struct Content {
    source: Arc<SourceFile>,
    range: SourceRange,
    labels: Vec<Label>,
    attributes: IndexMap<&'static str, Spanned<AttrValue>>,
    blocks: Vec<(&'static str, Content)>,
    definitions: Vec<Definition>,
    remain: Option<Body>,
}

impl Content {
    fn new(source: Arc<SourceFile>, range: SourceRange, labels: Vec<Label>) -> Self {
        Self {
            source,
            range,
            labels,
            attributes: Default::default(),
            blocks: Default::default(),
            definitions: Default::default(),
            remain: None,
        }
    }

    fn label(&self, index: usize) -> Label {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| Label::new(String::new(), self.range.clone()))
    }

    fn take(&mut self, name: &str) -> Option<Spanned<AttrValue>> {
        self.attributes.shift_remove(name)
    }

    fn string(&mut self, name: &str) -> Option<String> {
        self.spanned_string(name).map(|string| string.value)
    }

    fn spanned_string(&mut self, name: &str) -> Option<Spanned<String>> {
        let attr = self.take(name)?;
        match attr.value {
            AttrValue::String(value) => Some(Spanned::new(value, attr.range)),
            _ => None,
        }
    }

    fn bool(&mut self, name: &str) -> Option<bool> {
        match self.take(name)?.value {
            AttrValue::Bool(value) => Some(value),
            _ => None,
        }
    }

    fn strings(&mut self, name: &str) -> Option<Vec<String>> {
        match self.take(name)?.value {
            AttrValue::StringList(value) => Some(value),
            _ => None,
        }
    }

    fn expression(&mut self, name: &str) -> Option<Spanned<hcl::Expression>> {
        let attr = self.take(name)?;
        match attr.value {
            AttrValue::Expression(value) => Some(Spanned::new(value, attr.range)),
            _ => None,
        }
    }

    fn blocks<T: FromContent>(&mut self, kind: &str) -> Vec<T> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.blocks)
            .into_iter()
            .partition(|(block_kind, _)| *block_kind == kind);
        self.blocks = rest;

        matching
            .into_iter()
            .map(|(_, content)| T::from_content(content))
            .collect()
    }

    fn block<T: FromContent>(&mut self, kind: &str) -> Option<T> {
        self.blocks(kind).into_iter().next()
    }

    fn remainder(&mut self) -> Remainder {
        Remainder::new(
            self.remain.take().unwrap_or_else(Body::new),
            Arc::clone(&self.source),
        )
    }
}

/// Bookkeeping while walking one body
struct BodyState {
    content: Content,
    remain: Body,
    seen_attributes: IndexMap<String, SourceRange>,
    seen_blocks: IndexMap<&'static str, SourceRange>,
}

struct Decoder<'a> {
    source: &'a Arc<SourceFile>,
    /// Set for JSON documents, their bodies carry no spans
    origins: Option<&'a Origins>,
    /// Index path of the structure being decoded, see [Origins]
    path: Vec<usize>,
    diags: &'a mut Diagnostics,
}

impl<'a> Decoder<'a> {
    fn new(
        source: &'a Arc<SourceFile>,
        origins: Option<&'a Origins>,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Self {
            source,
            origins,
            path: vec![],
            diags,
        }
    }

    /// Range of the current structure, from its span or from where a JSON document defined it
    fn locate(
        &self,
        span: Option<Range<usize>>,
        origin: impl FnOnce(&Origin) -> Option<Range<usize>>,
    ) -> SourceRange {
        let span = match self.origins {
            Some(origins) => origins.get(&self.path).and_then(origin),
            None => span,
        };
        self.source.range_or_start(span)
    }

    fn structure_range(&self, node: &impl Span) -> SourceRange {
        self.locate(node.span(), |origin| Some(origin.structure.clone()))
    }

    fn ident_range(&self, block: &Block) -> SourceRange {
        self.locate(block.ident.span(), |origin| Some(origin.key.clone()))
    }

    fn label_range(&self, label: &BlockLabel, index: usize) -> SourceRange {
        self.locate(label_span(label), |origin| origin.labels.get(index).cloned())
    }

    fn value_range(&self, attr: &Attribute) -> SourceRange {
        self.locate(attr.value.span(), |origin| Some(origin.value.clone()))
    }

    fn error(&mut self, summary: impl Into<String>, detail: impl Into<String>, range: SourceRange) {
        self.diags.push(Diagnostic::error(summary, detail).with_range(range));
    }

    fn body(
        &mut self,
        schema: &'static BlockSchema,
        body: &Body,
        range: SourceRange,
        labels: Vec<Label>,
    ) -> Content {
        let mut state = BodyState {
            content: Content::new(Arc::clone(self.source), range, labels),
            remain: Body::new(),
            seen_attributes: Default::default(),
            seen_blocks: Default::default(),
        };

        for (index, structure) in body.iter().enumerate() {
            self.path.push(index);
            self.structure(schema, structure, &mut state);
            self.path.pop();
        }

        let BodyState {
            mut content,
            remain,
            seen_attributes,
            ..
        } = state;

        for attr_schema in schema.required_attributes() {
            if !seen_attributes.contains_key(attr_schema.name) {
                let range = content.range.clone();
                self.error(
                    "Missing required argument",
                    format!(
                        "The argument \"{}\" is required, but no definition was found.",
                        attr_schema.name
                    ),
                    range,
                );
            }
        }

        if schema.remain == Remain::Body {
            content.remain = Some(remain);
        }

        content
    }

    fn structure(&mut self, schema: &'static BlockSchema, structure: &Structure, state: &mut BodyState) {
        match structure {
            Structure::Attribute(attr) => {
                let name = attr.key.value().as_str();
                let attr_range = self.structure_range(attr);
                if let Some(previous) = state.seen_attributes.get(name) {
                    self.error(
                        "Duplicate argument",
                        format!("The argument \"{name}\" was already set at {previous}."),
                        attr_range,
                    );
                    return;
                }
                state
                    .seen_attributes
                    .insert(name.to_string(), attr_range.clone());

                match schema.attribute(name) {
                    Some(attr_schema) => {
                        if let Some(value) = self.value(attr_schema, attr) {
                            state
                                .content
                                .attributes
                                .insert(attr_schema.name, Spanned::new(value, attr_range));
                        }
                    }
                    None => self.unknown_attribute(
                        schema,
                        structure,
                        attr,
                        attr_range,
                        &mut state.content,
                        &mut state.remain,
                    ),
                }
            }
            Structure::Block(block) => {
                let kind = block.ident.value().as_str();
                match schema.block(kind) {
                    Some(nested) => {
                        let child =
                            self.nested_block(nested.schema, nested.repeat, block, &mut state.seen_blocks);
                        if let Some(child) = child {
                            state.content.blocks.push((nested.schema.kind, child));
                        }
                    }
                    None => match schema.remain {
                        Remain::Body => state.remain.push(structure.clone()),
                        Remain::Attributes => {
                            let range = self.ident_range(block);
                            self.error(
                                format!("Unexpected \"{kind}\" block"),
                                "Blocks are not allowed here.",
                                range,
                            );
                        }
                        Remain::None => {
                            let range = self.ident_range(block);
                            let mut detail = format!("Blocks of type \"{kind}\" are not expected here.");
                            if schema.attribute(kind).is_some() {
                                detail.push_str(&format!(
                                    " Did you mean to define an argument named \"{kind}\"?"
                                ));
                            }
                            self.error("Unsupported block type", detail, range);
                        }
                    },
                }
            }
        }
    }

    fn unknown_attribute(
        &mut self,
        schema: &'static BlockSchema,
        structure: &Structure,
        attr: &Attribute,
        range: SourceRange,
        content: &mut Content,
        remain: &mut Body,
    ) {
        let name = attr.key.value().as_str();
        match schema.remain {
            Remain::Body => remain.push(structure.clone()),
            Remain::Attributes => content.definitions.push(Definition {
                range,
                name: name.to_string(),
                expr: attr.value.clone().into(),
            }),
            Remain::None => {
                let mut detail = format!("An argument named \"{name}\" is not expected here.");
                if schema.block(name).is_some() {
                    detail.push_str(&format!(
                        " Did you mean to define a block of type \"{name}\"?"
                    ));
                }
                self.error("Unsupported argument", detail, range);
            }
        }
    }

    fn nested_block(
        &mut self,
        schema: &'static BlockSchema,
        repeat: Repeat,
        block: &Block,
        seen: &mut IndexMap<&'static str, SourceRange>,
    ) -> Option<Content> {
        let range = self.structure_range(block);
        let labels = self.labels(schema, block)?;

        if repeat == Repeat::Optional {
            if let Some(previous) = seen.get(schema.kind) {
                let detail = format!(
                    "Only one {} block is allowed. Another was defined at {previous}.",
                    schema.kind
                );
                let ident_range = self.ident_range(block);
                self.error(format!("Duplicate {} block", schema.kind), detail, ident_range);
                return None;
            }
            seen.insert(schema.kind, range.clone());
        }

        Some(self.body(schema, &block.body, range, labels))
    }

    fn labels(&mut self, schema: &'static BlockSchema, block: &Block) -> Option<Vec<Label>> {
        let expected = schema.labels;
        let found = &block.labels;

        if found.len() < expected.len() {
            let range = self.ident_range(block);
            self.error(
                format!("Missing {} for {}", expected[found.len()], schema.kind),
                format!(
                    "All {} blocks must have {} labels ({}).",
                    schema.kind,
                    expected.len(),
                    expected.join(", ")
                ),
                range,
            );
            return None;
        }

        if let Some(extraneous) = found.get(expected.len()) {
            let detail = if expected.is_empty() {
                format!("No labels are expected for {} blocks.", schema.kind)
            } else {
                format!(
                    "Only {} labels ({}) are expected for {} blocks.",
                    expected.len(),
                    expected.join(", "),
                    schema.kind
                )
            };
            let range = self.label_range(extraneous, expected.len());
            self.error(format!("Extraneous label for {}", schema.kind), detail, range);
            return None;
        }

        Some(
            found
                .iter()
                .enumerate()
                .map(|(index, label)| {
                    Label::new(label.as_str().to_string(), self.label_range(label, index))
                })
                .collect(),
        )
    }

    fn value(&mut self, attr_schema: &AttributeSchema, attr: &Attribute) -> Option<AttrValue> {
        let expr: hcl::Expression = attr.value.clone().into();

        let value = match attr_schema.kind {
            ValueKind::Expression => Some(AttrValue::Expression(expr.clone())),
            ValueKind::String => static_string(&expr).map(AttrValue::String),
            ValueKind::Bool => match &expr {
                hcl::Expression::Bool(value) => Some(AttrValue::Bool(*value)),
                _ => None,
            },
            ValueKind::StringList => match &expr {
                hcl::Expression::Array(items) => items
                    .iter()
                    .map(static_string)
                    .collect::<Option<Vec<_>>>()
                    .map(AttrValue::StringList),
                _ => None,
            },
        };

        if value.is_none() {
            let range = self.value_range(attr);
            let (summary, detail) = if is_literal(&expr) {
                (
                    "Incorrect attribute value type",
                    format!(
                        "Inappropriate value for attribute \"{}\": {} required.",
                        attr_schema.name,
                        attr_schema.kind.describe()
                    ),
                )
            } else {
                (
                    "Static value required",
                    format!(
                        "The attribute \"{}\" requires a {} literal; expressions are not evaluated while loading configuration.",
                        attr_schema.name,
                        attr_schema.kind.describe()
                    ),
                )
            };
            self.error(summary, detail, range);
        }

        value
    }
}

fn label_span(label: &BlockLabel) -> Option<Range<usize>> {
    match label {
        BlockLabel::Ident(ident) => ident.span(),
        BlockLabel::String(string) => string.span(),
    }
}

/// A string literal, or a template made only of literal parts (such as a heredoc without interpolations)
pub(crate) fn static_string(expr: &hcl::Expression) -> Option<String> {
    match expr {
        hcl::Expression::String(value) => Some(value.clone()),
        hcl::Expression::TemplateExpr(template_expr) => {
            let template = Template::from_expr(template_expr).ok()?;
            template
                .elements()
                .iter()
                .map(|element| match element {
                    Element::Literal(literal) => Some(literal.as_str()),
                    _ => None,
                })
                .collect()
        }
        _ => None,
    }
}

fn is_literal(expr: &hcl::Expression) -> bool {
    matches!(
        expr,
        hcl::Expression::Null
            | hcl::Expression::Bool(_)
            | hcl::Expression::Number(_)
            | hcl::Expression::String(_)
            | hcl::Expression::Array(_)
            | hcl::Expression::Object(_)
    )
}
