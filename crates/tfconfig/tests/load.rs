//! Integration tests
//!
//! Loads the files in /tests/fixtures/ the way the command line does: one session, one decode per file.

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tfconfig::config::{Config, ResourceMode};
use tfconfig::{LoadError, LoadSession};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Everything of a [Config] that does not depend on the syntax it was written in
fn outline(config: &Config) -> Vec<String> {
    let mut lines = vec![];

    if let Some(terraform) = &config.terraform {
        lines.push(format!("terraform {:?}", terraform.required_version));
        if let Some(backend) = &terraform.backend {
            let keys: Vec<_> = backend.config.attribute_keys().collect();
            lines.push(format!("backend {} {keys:?}", backend.r#type));
        }
    }
    for variable in &config.variables {
        lines.push(format!(
            "variable {} {:?} {:?} {:?}",
            variable.name,
            variable.declared_type,
            variable.default_value(),
            variable.description
        ));
    }
    for provider in &config.providers {
        let keys: Vec<_> = provider.config.attribute_keys().collect();
        lines.push(format!("provider {} {keys:?}", provider.full_name()));
    }
    for resource in &config.resources {
        let keys: Vec<_> = resource.config.attribute_keys().collect();
        let provisioners: Vec<_> = resource
            .provisioners
            .iter()
            .map(|provisioner| provisioner.r#type.as_str())
            .collect();
        lines.push(format!(
            "resource {} {:?} {:?} {:?} {provisioners:?} {keys:?}",
            resource.id(),
            resource.count,
            resource.depends_on,
            resource.lifecycle
        ));
    }
    for module in &config.modules {
        let keys: Vec<_> = module.config.attribute_keys().collect();
        lines.push(format!("module {} {} {keys:?}", module.name, module.source));
    }
    for output in &config.outputs {
        lines.push(format!("output {} {:?}", output.name, output.value));
    }
    for local in &config.locals {
        lines.push(format!("local {} {:?}", local.name, local.value));
    }

    lines
}

#[test]
fn missing_file_is_not_a_diagnostic() {
    let mut session = LoadSession::new();
    let err = session
        .load_file(fixture("does-not-exist.tf"))
        .expect_err("must fail");

    assert!(matches!(err, LoadError::Io { .. }), "{err:?}");
    assert!(err.diagnostics().is_none());
}

#[test]
fn syntax_errors_point_into_the_file() {
    let path = fixture("syntax.tf");
    let mut session = LoadSession::new();
    let err = session.load_file(&path).expect_err("must fail");

    let diagnostics = err.diagnostics().expect("syntax diagnostics");
    assert!(diagnostics.has_errors());
    for diagnostic in diagnostics {
        let range = diagnostic.range.as_ref().expect("located");
        assert_eq!(range.file(), path);
    }
}

#[test]
fn decode_full_configuration() {
    let mut session = LoadSession::new();
    let decoded = session
        .load_file(fixture("basic.tf"))
        .expect("valid syntax")
        .decode();

    assert!(decoded.diagnostics.is_empty(), "{}", decoded.diagnostics);

    let config = decoded.config;
    let terraform = config.terraform.as_ref().expect("terraform block");
    assert_eq!(terraform.required_version.as_deref(), Some(">= 0.11.0"));
    assert_eq!(
        terraform.backend.as_ref().map(|backend| backend.r#type.as_str()),
        Some("s3")
    );

    let names: Vec<_> = config.providers.iter().map(|p| p.full_name()).collect();
    assert_eq!(names, vec!["aws", "aws.west"]);

    let web = config
        .resource(ResourceMode::Managed, "aws_instance", "web")
        .expect("resource");
    assert!(web.count.is_some());
    assert_eq!(
        web.depends_on,
        Some(vec!["aws_security_group.web".to_string()])
    );
    assert_eq!(
        web.lifecycle.as_ref().and_then(|l| l.create_before_destroy),
        Some(true)
    );
    assert_eq!(web.provisioners.len(), 1);

    let base = config
        .resource(ResourceMode::Data, "aws_ami", "base")
        .expect("data source");
    assert_eq!(base.count, None);
    assert_eq!(base.config.attribute_keys().collect::<Vec<_>>(), vec!["most_recent"]);

    assert_eq!(config.modules[0].source, "./network");
    assert!(config.output("address").is_some());
    assert_eq!(config.locals[0].name, "prefix");
}

#[test]
fn json_syntax_decodes_to_the_same_configuration() {
    let mut session = LoadSession::new();
    let native = session
        .load_file(fixture("basic.tf"))
        .expect("valid native syntax")
        .decode();
    let json = session
        .load_file(fixture("basic.tf.json"))
        .expect("valid json syntax")
        .decode();

    assert!(json.diagnostics.is_empty(), "{}", json.diagnostics);
    assert_eq!(outline(&json.config), outline(&native.config));
}

#[test]
fn broken_configuration_still_reports_required_version() {
    let mut session = LoadSession::new();
    let decoded = session
        .load_file(fixture("broken.tf"))
        .expect("valid syntax")
        .decode();

    assert!(decoded.has_errors());
    assert_eq!(
        decoded
            .config
            .terraform
            .and_then(|terraform| terraform.required_version),
        Some("1.0".to_string())
    );
    assert!(decoded.config.resources.is_empty());
}

#[test]
fn broken_json_still_reports_required_version() {
    let path = fixture("broken.tf.json");
    let mut session = LoadSession::new();
    let decoded = session.load_file(&path).expect("valid json").decode();

    let located: Vec<_> = decoded
        .diagnostics
        .iter()
        .map(|diagnostic| {
            let range = diagnostic.range.as_ref().expect("located");
            assert_eq!(range.file(), path);
            (diagnostic.summary.as_str(), range.start.line, range.start.column)
        })
        .collect();
    assert_eq!(located, vec![("Incorrect JSON value type", 6, 21)]);

    assert_eq!(
        decoded
            .config
            .terraform
            .and_then(|terraform| terraform.required_version),
        Some("1.0".to_string())
    );
}

#[test]
fn json_diagnostics_are_located() {
    let mut session = LoadSession::new();
    let decoded = session
        .load_str("unsupported.tf.json", include_str!("fixtures/unsupported.tf.json"))
        .expect("valid json")
        .decode();

    let located: Vec<_> = decoded
        .diagnostics
        .iter()
        .map(|diagnostic| {
            let range = diagnostic.range.as_ref().expect("located");
            format!("{range}: {}", diagnostic.summary)
        })
        .collect();

    insta::assert_snapshot!(located.join("\n"), @r"
    unsupported.tf.json:4,7-4,19: Unsupported argument
    unsupported.tf.json:8,5-8,14: Missing required argument
    ");
}

#[test]
fn rendered_diagnostic() {
    let mut session = LoadSession::new();
    let decoded = session
        .load_str("broken.tf", include_str!("fixtures/broken.tf"))
        .expect("valid syntax")
        .decode();

    assert_eq!(decoded.diagnostics.len(), 1);
    let rendered = session.render(&decoded.diagnostics.as_slice()[0]);

    for expected in [
        "Missing name for resource",
        "broken.tf:5:1",
        "resource \"only_a_type\" {",
        "All resource blocks must have 2 labels (type, name).",
    ] {
        assert!(rendered.contains(expected), "{expected} not in\n{rendered}");
    }
}

#[test]
fn each_file_keeps_its_diagnostics() {
    let native = fixture("broken.tf");
    let json = fixture("broken.tf.json");

    let mut session = LoadSession::new();
    let mut config = Config::default();
    let mut located = vec![];
    let mut rendered = vec![];

    for path in [&native, &json] {
        let decoded = session.load_file(path).expect("valid syntax").decode();
        assert!(decoded.has_errors());

        for diagnostic in &decoded.diagnostics {
            let range = diagnostic.range.as_ref().expect("located");
            assert_eq!(range.file(), path.as_path(), "{}", diagnostic.summary);
            located.push((diagnostic.summary.clone(), range.start.line));
            rendered.push(session.render(diagnostic));
        }
        assert!(config.merge(decoded.config).is_empty());
    }

    assert_eq!(
        located,
        vec![
            ("Missing name for resource".to_string(), 5),
            ("Incorrect JSON value type".to_string(), 6),
        ]
    );
    assert!(rendered[0].contains("resource \"only_a_type\" {"), "{}", rendered[0]);
    assert!(rendered[1].contains("\"aws_instance\": \"web\""), "{}", rendered[1]);
    assert_eq!(
        config.terraform.and_then(|terraform| terraform.required_version),
        Some("1.0".to_string())
    );
}

#[test]
fn files_of_one_module_share_a_session() {
    let main = fixture("module/main.tf");
    let other = fixture("module/override.tf");

    let mut session = LoadSession::new();
    let mut config = Config::default();
    let mut diagnostics = vec![];

    for path in [&main, &other] {
        let decoded = session.load_file(path).expect("valid syntax").decode();
        assert!(decoded.diagnostics.is_empty(), "{}", decoded.diagnostics);
        diagnostics.extend(config.merge(decoded.config));
    }

    assert_eq!(session.files().count(), 2);
    assert_eq!(diagnostics.len(), 1);

    let duplicate = &diagnostics[0];
    assert_eq!(duplicate.summary, "Duplicate variable");
    let range = duplicate.range.as_ref().expect("located");
    assert_eq!(range.file(), other);
    assert_eq!(range.start.line, 1);
    assert!(
        duplicate.detail.contains(&main.display().to_string()),
        "{}",
        duplicate.detail
    );

    // the first declaration wins, the second resource is still added
    assert_eq!(config.variable("region").and_then(|v| v.default.as_ref()), None);
    assert_eq!(config.resources.len(), 2);

    let rendered = session.render(duplicate);
    assert!(rendered.contains("override.tf:1:1"), "{rendered}");
    assert!(rendered.contains("variable \"region\" {"), "{rendered}");
}
