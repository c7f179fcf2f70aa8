//! JSON syntax
//!
//! A JSON document does not say whether an object is a block or an attribute value, that depends on the schema.
//! We walk the JSON value together with [schema::TOP_LEVEL]:
//! - a key naming a nested block consumes one object level per label, arrays of objects repeat the block
//! - every other key is an attribute, its value becomes an equivalent hcl expression
//! - keys named `//` are comments
//!
//! Inside bodies that the schema forwards as remainder everything is an attribute.
//!
//! The JSON text is read with byte spans, the result is built as an [hcl::Body] and converted into the same kind of
//! body the native parser produces. Converted structures carry no spans, [Origins] records where each of them came
//! from so diagnostics can point into the JSON file.
//! Strings are templates in JSON syntax too, so `"${var.x}"` stays an interpolation.
//!
//! Only invalid JSON fails the load. An entry that cannot become a block is left out of the body and reported in
//! [Translation::diagnostics].
use crate::diagnostic::{Diagnostic, Diagnostics, SourceRange};
use crate::schema::{self, BlockSchema};
use crate::source::SourceFile;
use std::collections::HashMap;
use std::ops::Range;
use winnow::{
    Parser as _,
    ascii::multispace0,
    combinator::{alt, cut_err, delimited, repeat, separated},
    error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue},
    stream::{LocatingSlice, Location},
    token::{any, literal, none_of, take_while},
};

const COMMENT_KEY: &str = "//";

type Input<'a> = LocatingSlice<&'a str>;

/// A JSON document as hcl body
#[derive(Debug)]
pub struct Translation {
    pub body: hcl_edit::structure::Body,
    pub origins: Origins,
    /// Entries that could not be translated, they are missing from `body`
    pub diagnostics: Diagnostics,
}

/// Byte ranges in the JSON text of every translated structure
///
/// Structures are addressed by index path: the index in the top level body, followed by the index inside that
/// block's body and so on.
#[derive(Debug, Clone, Default)]
pub struct Origins(HashMap<Vec<usize>, Origin>);

impl Origins {
    pub fn get(&self, path: &[usize]) -> Option<&Origin> {
        self.0.get(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// From the attribute name or the innermost block label to the end of the value
    pub structure: Range<usize>,
    /// Attribute name or block type
    pub key: Range<usize>,
    pub labels: Vec<Range<usize>>,
    pub value: Range<usize>,
}

pub fn parse_body(source: &SourceFile) -> Result<Translation, Diagnostics> {
    let root = read(source)?;

    let mut builder = Builder {
        source,
        origins: Origins::default(),
        diags: Diagnostics::new(),
    };

    let body = match &root.kind {
        NodeKind::Object(members) => builder.body(members, &schema::TOP_LEVEL, &mut vec![]),
        _ => {
            builder.error(
                root.span.clone(),
                "Root value must be object",
                "The root value in a JSON-based configuration must be a JSON object.",
            );
            hcl::Body::from_iter(std::iter::empty::<hcl::Structure>())
        }
    };

    let Builder { origins, diags, .. } = builder;
    tracing::trace!(structures = origins.len(), issues = diags.len(), "translated json document");

    Ok(Translation {
        body: body.into(),
        origins,
        diagnostics: diags,
    })
}

/// JSON value with the byte range it was read from
#[derive(Debug, Clone, PartialEq)]
struct Node {
    kind: NodeKind,
    span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Node>),
    /// members in document order, duplicates included
    Object(Vec<Member>),
}

#[derive(Debug, Clone, PartialEq)]
struct Member {
    key: String,
    key_span: Range<usize>,
    value: Node,
}

fn read(source: &SourceFile) -> Result<Node, Diagnostics> {
    let mut input = Input::new(source.text());

    let detail = match delimited(multispace0, json_value, multispace0).parse_next(&mut input) {
        Ok(root) if input.is_empty() => return Ok(root),
        Ok(_) => "Extra characters after the root value.".to_string(),
        Err(err) => describe(err),
    };

    let offset = input.current_token_start();
    Err(Diagnostic::error("Invalid JSON syntax", detail)
        .with_range(source.range(offset..offset))
        .into())
}

fn describe(err: ErrMode<ContextError>) -> String {
    let context = match err {
        ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx,
        ErrMode::Incomplete(_) => ContextError::new(),
    };

    let message = context
        .context()
        .find_map(|ctx| match ctx {
            StrContext::Expected(expected) => Some(format!("Expected {expected}.")),
            _ => None,
        })
        .unwrap_or_else(|| "The document is not valid JSON.".to_string());
    message
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

fn json_value(input: &mut Input<'_>) -> ModalResult<Node> {
    alt((
        object.map(NodeKind::Object),
        array.map(NodeKind::Array),
        string.map(NodeKind::String),
        number.map(NodeKind::Number),
        literal("true").value(NodeKind::Bool(true)),
        literal("false").value(NodeKind::Bool(false)),
        literal("null").value(NodeKind::Null),
    ))
    .context(expected("a JSON value"))
    .with_span()
    .map(|(kind, span)| Node { kind, span })
    .parse_next(input)
}

fn object(input: &mut Input<'_>) -> ModalResult<Vec<Member>> {
    delimited(
        ('{', multispace0),
        separated(0.., member, (multispace0, ',', multispace0)),
        (multispace0, cut_err('}'.context(expected("`,` or `}`")))),
    )
    .parse_next(input)
}

fn member(input: &mut Input<'_>) -> ModalResult<Member> {
    (
        string.with_span(),
        multispace0,
        cut_err(':'.context(expected("`:`"))),
        multispace0,
        cut_err(json_value),
    )
        .map(|((key, key_span), _, _, _, value)| Member {
            key,
            key_span,
            value,
        })
        .parse_next(input)
}

fn array(input: &mut Input<'_>) -> ModalResult<Vec<Node>> {
    delimited(
        ('[', multispace0),
        separated(0.., json_value, (multispace0, ',', multispace0)),
        (multispace0, cut_err(']'.context(expected("`,` or `]`")))),
    )
    .parse_next(input)
}

/// Escapes are only delimited here, decoding is left to serde_json
fn string(input: &mut Input<'_>) -> ModalResult<String> {
    ('"', cut_err((characters, '"'.context(expected("closing `\"`")))))
        .take()
        .try_map(|raw: &str| serde_json::from_str::<String>(raw))
        .parse_next(input)
}

fn characters(input: &mut Input<'_>) -> ModalResult<()> {
    repeat(0.., alt((('\\', any).void(), none_of(['"', '\\']).void()))).parse_next(input)
}

fn number(input: &mut Input<'_>) -> ModalResult<serde_json::Number> {
    take_while(1.., |c: char| {
        c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
    })
    .try_map(|raw: &str| raw.parse::<serde_json::Number>())
    .parse_next(input)
}

struct Builder<'a> {
    source: &'a SourceFile,
    origins: Origins,
    diags: Diagnostics,
}

impl Builder<'_> {
    fn error(&mut self, span: Range<usize>, summary: &str, detail: impl Into<String>) {
        let range: SourceRange = self.source.range(span);
        self.diags
            .push(Diagnostic::error(summary, detail).with_range(range));
    }

    fn record(&mut self, path: &[usize], index: usize, origin: Origin) {
        let mut key = path.to_vec();
        key.push(index);
        self.origins.0.insert(key, origin);
    }

    fn body(
        &mut self,
        members: &[Member],
        schema: &'static BlockSchema,
        path: &mut Vec<usize>,
    ) -> hcl::Body {
        let mut structures: Vec<hcl::Structure> = vec![];

        for member in members.iter().filter(|member| member.key != COMMENT_KEY) {
            match schema.block(&member.key) {
                Some(nested) => {
                    self.blocks(nested.schema, member, &member.value, &mut vec![], &mut structures, path)
                }
                None => {
                    let expr = self.expression(&member.value);
                    let origin = Origin {
                        structure: member.key_span.start..member.value.span.end,
                        key: member.key_span.clone(),
                        labels: vec![],
                        value: member.value.span.clone(),
                    };
                    self.record(path, structures.len(), origin);
                    structures.push(hcl::Attribute::new(hcl::Identifier::unchecked(&member.key), expr).into());
                }
            }
        }

        structures.into_iter().collect()
    }

    fn blocks<'v>(
        &mut self,
        schema: &'static BlockSchema,
        kind: &'v Member,
        value: &'v Node,
        labels: &mut Vec<&'v Member>,
        out: &mut Vec<hcl::Structure>,
        path: &mut Vec<usize>,
    ) {
        let missing_label = schema.labels.get(labels.len());

        match (&value.kind, missing_label) {
            (NodeKind::Array(items), _) => {
                for item in items {
                    self.blocks(schema, kind, item, labels, out, path);
                }
            }
            (NodeKind::Object(members), Some(_)) => {
                for member in members.iter().filter(|member| member.key != COMMENT_KEY) {
                    labels.push(member);
                    self.blocks(schema, kind, &member.value, labels, out, path);
                    labels.pop();
                }
            }
            (NodeKind::Object(members), None) => {
                let start = labels.last().map_or(kind.key_span.start, |label| label.key_span.start);
                let origin = Origin {
                    structure: start..value.span.end,
                    key: kind.key_span.clone(),
                    labels: labels.iter().map(|label| label.key_span.clone()).collect(),
                    value: value.span.clone(),
                };

                let index = out.len();
                self.record(path, index, origin);
                path.push(index);
                let body = self.body(members, schema, path);
                path.pop();

                out.push(
                    hcl::Block {
                        identifier: hcl::Identifier::unchecked(schema.kind),
                        labels: labels
                            .iter()
                            .map(|label| hcl::BlockLabel::String(label.key.clone()))
                            .collect(),
                        body,
                    }
                    .into(),
                );
            }
            (_, Some(label)) => self.error(
                value.span.clone(),
                "Incorrect JSON value type",
                format!(
                    "A JSON object is required here, whose keys are the {label} of the {} block.",
                    schema.kind
                ),
            ),
            (_, None) => self.error(
                value.span.clone(),
                "Incorrect JSON value type",
                format!(
                    "A JSON object is required here, to define the content of a {} block.",
                    schema.kind
                ),
            ),
        }
    }

    fn expression(&mut self, node: &Node) -> hcl::Expression {
        match &node.kind {
            NodeKind::Null => hcl::Expression::Null,
            NodeKind::Bool(value) => hcl::Expression::Bool(*value),
            NodeKind::Number(number) => number_expression(number),
            NodeKind::String(value) => self.string(value, &node.span),
            NodeKind::Array(items) => {
                hcl::Expression::Array(items.iter().map(|item| self.expression(item)).collect())
            }
            NodeKind::Object(members) => hcl::Expression::Object(
                members
                    .iter()
                    .map(|member| {
                        let key = hcl::ObjectKey::Expression(hcl::Expression::String(member.key.clone()));
                        (key, self.expression(&member.value))
                    })
                    .collect(),
            ),
        }
    }

    fn string(&mut self, value: &str, span: &Range<usize>) -> hcl::Expression {
        if !(value.contains("${") || value.contains("%{")) {
            return hcl::Expression::String(value.to_string());
        }

        let template = hcl::TemplateExpr::QuotedString(value.to_string());
        match hcl::Template::from_expr(&template) {
            Ok(_) => hcl::Expression::TemplateExpr(Box::new(template)),
            Err(err) => {
                self.error(span.clone(), "Invalid template", err.to_string());
                hcl::Expression::String(value.to_string())
            }
        }
    }
}

fn number_expression(number: &serde_json::Number) -> hcl::Expression {
    let converted = if let Some(value) = number.as_u64() {
        Some(hcl::Number::from(value))
    } else if let Some(value) = number.as_i64() {
        Some(hcl::Number::from(value))
    } else {
        number.as_f64().and_then(hcl::Number::from_f64)
    };

    converted.map_or(hcl::Expression::Null, hcl::Expression::Number)
}

#[cfg(test)]
mod test {
    use super::*;
    use hcl_edit::structure::{Body, Structure};
    use pretty_assertions::assert_eq;

    fn translate(text: &str) -> Result<Translation, Diagnostics> {
        parse_body(&SourceFile::new("main.tf.json", text))
    }

    fn block_summary(body: &Body) -> Vec<String> {
        body.iter()
            .filter_map(|structure| match structure {
                Structure::Block(block) => Some(
                    std::iter::once(block.ident.value().to_string())
                        .chain(block.labels.iter().map(|label| label.as_str().to_string()))
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
                _ => None,
            })
            .collect()
    }

    fn summaries(diags: &Diagnostics) -> Vec<&str> {
        diags.iter().map(|diag| diag.summary.as_str()).collect()
    }

    #[test]
    fn blocks_consume_labels() {
        let translation = translate(
            r#"{
              "//": "comment",
              "resource": {
                "aws_instance": {
                  "web": { "ami": "ami-1" },
                  "db": [{ "ami": "ami-2" }]
                }
              },
              "variable": { "region": { "default": "eu-west-1" } },
              "terraform": { "required_version": ">= 0.11" }
            }"#,
        )
        .expect("valid json");

        assert!(translation.diagnostics.is_empty(), "{}", translation.diagnostics);
        assert_eq!(
            block_summary(&translation.body),
            vec![
                "resource aws_instance web",
                "resource aws_instance db",
                "variable region",
                "terraform",
            ]
        );
    }

    #[test]
    fn remainder_keys_need_not_be_identifiers() {
        let translation = translate(r#"{"provider": {"aws": {"x:y": 1, "assume_role": {"role_arn": "x"}}}}"#)
            .expect("valid json");

        assert!(translation.diagnostics.is_empty(), "{}", translation.diagnostics);

        let Some(Structure::Block(provider)) = translation.body.iter().next() else {
            panic!("provider block expected");
        };
        let keys: Vec<_> = provider
            .body
            .iter()
            .filter_map(|structure| structure.as_attribute())
            .map(|attr| attr.key.value().to_string())
            .collect();
        assert_eq!(keys, vec!["x:y", "assume_role"]);
    }

    #[test]
    fn origins_point_into_the_json_text() {
        let text = "{\n  \"variable\": {\n    \"region\": {\n      \"default\": \"eu\"\n    }\n  }\n}";
        let translation = translate(text).expect("valid json");

        let block = translation.origins.get(&[0]).expect("variable block");
        assert_eq!(&text[block.key.clone()], "\"variable\"");
        assert_eq!(
            block.labels.iter().map(|span| &text[span.clone()]).collect::<Vec<_>>(),
            vec!["\"region\""]
        );

        let default = translation.origins.get(&[0, 0]).expect("default attribute");
        assert_eq!(&text[default.structure.clone()], "\"default\": \"eu\"");
        assert_eq!(&text[default.value.clone()], "\"eu\"");
    }

    #[test]
    fn syntax_error_has_position() {
        let diags = translate("{\n  \"variable\": \n").expect_err("must fail");
        let range = diags.as_slice()[0].range.as_ref().expect("range");

        assert_eq!(range.file(), std::path::Path::new("main.tf.json"));
        assert_eq!(range.start.line, 3);
        assert_eq!(summaries(&diags), vec!["Invalid JSON syntax"]);
    }

    #[test]
    fn trailing_text_is_a_syntax_error() {
        let diags = translate("{} {}").expect_err("must fail");
        let range = diags.as_slice()[0].range.as_ref().expect("range");

        assert_eq!(range.start.column, 4);
    }

    #[test]
    fn root_must_be_object() {
        let translation = translate("[]").expect("valid json");

        assert!(translation.body.iter().next().is_none());
        assert_eq!(summaries(&translation.diagnostics), vec!["Root value must be object"]);
    }

    #[test]
    fn bad_block_content_is_skipped() {
        let text = "{\n  \"terraform\": {\"required_version\": \"1.0\"},\n  \"resource\": {\"x\": \"y\"}\n}";
        let translation = translate(text).expect("valid json");

        assert_eq!(block_summary(&translation.body), vec!["terraform"]);
        assert_eq!(summaries(&translation.diagnostics), vec!["Incorrect JSON value type"]);

        let range = translation.diagnostics.as_slice()[0]
            .range
            .as_ref()
            .expect("range");
        assert_eq!((range.start.line, range.start.column), (3, 21));
    }

    #[test]
    fn templates_stay_templates() {
        let translation = translate(r#"{"output": {"ip": {"value": "${aws_instance.web.ip}"}}}"#)
            .expect("valid json");

        let Some(Structure::Block(output)) = translation.body.iter().next() else {
            panic!("output block expected");
        };
        let value: hcl::Expression = output
            .body
            .iter()
            .filter_map(|structure| structure.as_attribute())
            .find(|attr| attr.key.value().as_str() == "value")
            .expect("value attribute")
            .value
            .clone()
            .into();
        assert!(matches!(value, hcl::Expression::TemplateExpr(_)), "{value:?}");
    }
}
