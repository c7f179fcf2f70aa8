//! second decode pass: grammar-shaped structures into the canonical [Config]
//!
//! [decode] runs the shallow decode first. When that reports errors, the document is only searched for the few
//! values a caller needs right away ([recover]), so a broken file still tells which `required_version` it wants.
//! Otherwise every shallow structure is lowered into its domain entity and uniqueness is checked.
use crate::config::{
    Atlas, Backend, Config, Local, Module, Output, ProviderConfig, Provisioner,
    ProvisionerOnFailure, ProvisionerWhen, Resource, ResourceLifecycle, ResourceMode, Terraform,
    Variable,
};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::shallow::{self, static_string, Spanned, TopLevel};
use crate::source::Document;
use hcl_edit::structure::Structure;

/// Result of decoding one [Document]
///
/// `config` is usable even when `diagnostics` contains errors, it then holds whatever could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub config: Config,
    pub diagnostics: Diagnostics,
}

impl Decoded {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(file=%document.filename().display()))]
pub fn decode(document: &Document) -> Decoded {
    let (raw, mut diagnostics) = shallow::decode(document);

    if diagnostics.has_errors() {
        tracing::debug!(
            errors = diagnostics.errors().count(),
            "structural errors, recovering partial configuration"
        );
        return Decoded {
            config: recover(document),
            diagnostics,
        };
    }

    let unchecked = lower(raw, &mut diagnostics);

    let mut config = Config::default();
    diagnostics.append(config.merge(unchecked));

    tracing::debug!(
        variables = config.variables.len(),
        resources = config.resources.len(),
        issues = diagnostics.len(),
        "configuration decoded"
    );
    Decoded {
        config,
        diagnostics,
    }
}

/// Narrow decode of the values worth having even when the rest of the document is broken
///
/// Currently `terraform.required_version`: the first string literal found in a top level `terraform` block.
pub fn recover(document: &Document) -> Config {
    let required_version = document
        .body()
        .iter()
        .filter_map(|structure| match structure {
            Structure::Block(block) if block.ident.value().as_str() == "terraform" => Some(block),
            _ => None,
        })
        .flat_map(|block| block.body.iter())
        .find_map(|structure| match structure {
            Structure::Attribute(attr) if attr.key.value().as_str() == "required_version" => {
                static_string(&attr.value.clone().into())
            }
            _ => None,
        });

    tracing::trace!(?required_version, "recovered");
    Config {
        terraform: required_version.map(|required_version| Terraform {
            required_version: Some(required_version),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Map shallow structures to entities, without checking uniqueness
fn lower(raw: TopLevel, diags: &mut Diagnostics) -> Config {
    let resources = raw
        .resources
        .into_iter()
        .map(|resource| (ResourceMode::Managed, resource))
        .chain(raw.datas.into_iter().map(|data| (ResourceMode::Data, data)))
        .map(|(mode, resource)| lower_resource(mode, resource, diags))
        .collect();

    Config {
        terraform: raw.terraform.map(|terraform| Terraform {
            required_version: terraform.required_version,
            backend: terraform.backend.map(|backend| Backend {
                r#type: backend.r#type.value,
                config: backend.config,
                decl_range: Some(backend.range),
            }),
            decl_range: Some(terraform.range),
        }),
        atlas: raw.atlas.map(|atlas| Atlas {
            name: atlas.name,
            include: atlas.include,
            exclude: atlas.exclude,
            decl_range: Some(atlas.range),
        }),
        variables: raw
            .variables
            .into_iter()
            .map(|variable| lower_variable(variable, diags))
            .collect(),
        providers: raw
            .providers
            .into_iter()
            .map(|provider| ProviderConfig {
                name: provider.name.value,
                alias: provider.alias,
                version: provider.version,
                config: provider.config,
                decl_range: Some(provider.range),
            })
            .collect(),
        modules: raw
            .modules
            .into_iter()
            .map(|module| Module {
                name: module.name.value,
                source: module.source,
                config: module.config,
                decl_range: Some(module.range),
            })
            .collect(),
        resources,
        outputs: raw
            .outputs
            .into_iter()
            .map(|output| Output {
                name: output.name.value,
                value: output.value,
                depends_on: output.depends_on,
                description: output.description,
                sensitive: output.sensitive,
                decl_range: Some(output.range),
            })
            .collect(),
        locals: raw
            .locals
            .into_iter()
            .flat_map(|locals| locals.definitions)
            .map(|definition| Local {
                name: definition.name,
                value: definition.expr,
                decl_range: Some(definition.range),
            })
            .collect(),
    }
}

fn lower_variable(raw: shallow::Variable, diags: &mut Diagnostics) -> Variable {
    let variable = Variable {
        name: raw.name.value,
        declared_type: raw.declared_type,
        default: raw.default.as_ref().map(|default| default.value.clone()),
        description: raw.description,
        sensitive: raw.sensitive,
        decl_range: Some(raw.range),
    };

    if let (Some(Err(err)), Some(default)) = (variable.default_value(), raw.default) {
        diags.push(
            Diagnostic::warning(
                "Unsupported default value",
                format!(
                    "The default of variable \"{}\" is kept unevaluated: {err}.",
                    variable.name
                ),
            )
            .with_range(default.range),
        );
    }

    variable
}

fn lower_resource(mode: ResourceMode, raw: shallow::Resource, diags: &mut Diagnostics) -> Resource {
    Resource {
        mode,
        r#type: raw.r#type.value,
        name: raw.name.value,
        lifecycle: raw.lifecycle.map(|lifecycle| ResourceLifecycle {
            create_before_destroy: lifecycle.create_before_destroy,
            prevent_destroy: lifecycle.prevent_destroy,
            ignore_changes: lifecycle.ignore_changes,
        }),
        provisioners: raw
            .provisioners
            .into_iter()
            .map(|provisioner| lower_provisioner(provisioner, diags))
            .collect(),
        depends_on: raw.depends_on,
        provider: raw.provider,
        count: raw.count,
        config: raw.config,
        decl_range: Some(raw.range),
    }
}

fn lower_provisioner(raw: shallow::Provisioner, diags: &mut Diagnostics) -> Provisioner {
    let when = raw.when.and_then(|when| {
        keyword(
            when,
            "when",
            &[("create", ProvisionerWhen::Create), ("destroy", ProvisionerWhen::Destroy)],
            diags,
        )
    });
    let on_failure = raw.on_failure.and_then(|on_failure| {
        keyword(
            on_failure,
            "on_failure",
            &[
                ("continue", ProvisionerOnFailure::Continue),
                ("fail", ProvisionerOnFailure::Fail),
            ],
            diags,
        )
    });

    Provisioner {
        r#type: raw.r#type.value,
        when,
        on_failure,
        connection: raw.connection.map(|connection| connection.config),
        config: raw.config,
    }
}

/// Look up a keyword argument, reporting values that are not one of `allowed`
fn keyword<T: Copy>(
    value: Spanned<String>,
    name: &str,
    allowed: &[(&str, T)],
    diags: &mut Diagnostics,
) -> Option<T> {
    if let Some((_, keyword)) = allowed.iter().find(|(key, _)| *key == value.value) {
        return Some(*keyword);
    }

    let expected: Vec<_> = allowed.iter().map(|(key, _)| format!("\"{key}\"")).collect();
    diags.push(
        Diagnostic::error(
            format!("Invalid {name} value"),
            format!(
                "The \"{name}\" argument requires one of {}, got \"{}\".",
                expected.join(" or "),
                value.value
            ),
        )
        .with_range(value.range),
    );
    None
}
