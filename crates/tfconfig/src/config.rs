//! canonical configuration model
//!
//! This is what [crate::lower] produces and what the provisioning engine consumes. Absent optional attributes are
//! `None`, never a zero value. Expressions (`count`, output and local values, variable defaults) are kept as
//! unevaluated [hcl::Expression]s; evaluation needs a context that only exists later.
use crate::diagnostic::{Diagnostic, Diagnostics, SourceRange};
use crate::value::{UnsupportedValue, Value};
use serde::Serialize;
use std::fmt;

pub use crate::shallow::Remainder;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub terraform: Option<Terraform>,
    pub atlas: Option<Atlas>,
    pub variables: Vec<Variable>,
    pub providers: Vec<ProviderConfig>,
    pub modules: Vec<Module>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
    pub locals: Vec<Local>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Terraform {
    pub required_version: Option<String>,
    pub backend: Option<Backend>,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backend {
    pub r#type: String,
    pub config: Remainder,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atlas {
    pub name: String,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub declared_type: Option<String>,
    /// Unevaluated, see [crate::value::Value] for the supported conversion
    pub default: Option<hcl::Expression>,
    pub description: Option<String>,
    pub sensitive: Option<bool>,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub alias: Option<String>,
    pub version: Option<String>,
    pub config: Remainder,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

impl Variable {
    /// Convert the default, if any, with the structural mapping of [Value]
    pub fn default_value(&self) -> Option<Result<Value, UnsupportedValue>> {
        self.default.as_ref().map(Value::try_from)
    }
}

impl ProviderConfig {
    /// `name` or `name.alias`
    pub fn full_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{alias}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    pub source: String,
    pub config: Remainder,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub mode: ResourceMode,
    pub r#type: String,
    pub name: String,
    pub lifecycle: Option<ResourceLifecycle>,
    pub provisioners: Vec<Provisioner>,
    pub depends_on: Option<Vec<String>>,
    pub provider: Option<String>,
    /// Unevaluated, even when it is a literal
    pub count: Option<hcl::Expression>,
    pub config: Remainder,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

impl Resource {
    pub fn id(&self) -> ResourceId<'_> {
        ResourceId {
            mode: self.mode,
            r#type: &self.r#type,
            name: &self.name,
        }
    }
}

/// Identity of a [Resource] within one [Config]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId<'a> {
    pub mode: ResourceMode,
    pub r#type: &'a str,
    pub name: &'a str,
}

impl fmt::Display for ResourceId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.r#type, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.r#type, self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceLifecycle {
    pub create_before_destroy: Option<bool>,
    pub prevent_destroy: Option<bool>,
    pub ignore_changes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provisioner {
    pub r#type: String,
    pub when: Option<ProvisionerWhen>,
    pub on_failure: Option<ProvisionerOnFailure>,
    pub connection: Option<Remainder>,
    pub config: Remainder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerWhen {
    Create,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerOnFailure {
    Continue,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub name: String,
    /// Unevaluated
    pub value: hcl::Expression,
    pub depends_on: Option<Vec<String>>,
    pub description: Option<String>,
    pub sensitive: Option<bool>,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Local {
    pub name: String,
    /// Unevaluated
    pub value: hcl::Expression,
    #[serde(skip)]
    pub decl_range: Option<SourceRange>,
}

impl Config {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    pub fn resource(&self, mode: ResourceMode, r#type: &str, name: &str) -> Option<&Resource> {
        let id = ResourceId {
            mode,
            r#type,
            name,
        };
        self.resources.iter().find(|resource| resource.id() == id)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|output| output.name == name)
    }

    /// Add the entities of another file of the same module
    ///
    /// Entities that would break uniqueness are dropped and reported; the one already present wins.
    pub fn merge(&mut self, other: Config) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if let Some(other_terraform) = other.terraform {
            match self.terraform.as_mut() {
                Some(terraform) => terraform.merge(other_terraform, &mut diags),
                None => self.terraform = Some(other_terraform),
            }
        }

        if let Some(atlas) = other.atlas {
            match &self.atlas {
                Some(existing) => diags.push(
                    Diagnostic::error(
                        "Duplicate atlas block",
                        format!(
                            "Only one atlas block is allowed per configuration. Another was defined{}.",
                            declared_at(existing.decl_range.as_ref())
                        ),
                    )
                    .with_range(atlas.decl_range),
                ),
                None => self.atlas = Some(atlas),
            }
        }

        for variable in other.variables {
            if let Some(existing) = self.variable(&variable.name) {
                diags.push(duplicate(
                    "variable",
                    &variable.name,
                    existing.decl_range.as_ref(),
                    variable.decl_range,
                ));
                continue;
            }
            self.variables.push(variable);
        }

        for provider in other.providers {
            if let Some(existing) = self
                .providers
                .iter()
                .find(|existing| existing.name == provider.name && existing.alias == provider.alias)
            {
                diags.push(duplicate(
                    "provider configuration",
                    &provider.full_name(),
                    existing.decl_range.as_ref(),
                    provider.decl_range,
                ));
                continue;
            }
            self.providers.push(provider);
        }

        for module in other.modules {
            if let Some(existing) = self
                .modules
                .iter()
                .find(|existing| existing.name == module.name)
            {
                diags.push(duplicate(
                    "module",
                    &module.name,
                    existing.decl_range.as_ref(),
                    module.decl_range,
                ));
                continue;
            }
            self.modules.push(module);
        }

        for resource in other.resources {
            if let Some(existing) = self
                .resources
                .iter()
                .find(|existing| existing.id() == resource.id())
            {
                diags.push(duplicate(
                    "resource",
                    &resource.id().to_string(),
                    existing.decl_range.as_ref(),
                    resource.decl_range,
                ));
                continue;
            }
            self.resources.push(resource);
        }

        for output in other.outputs {
            if let Some(existing) = self.output(&output.name) {
                diags.push(duplicate(
                    "output",
                    &output.name,
                    existing.decl_range.as_ref(),
                    output.decl_range,
                ));
                continue;
            }
            self.outputs.push(output);
        }

        for local in other.locals {
            if let Some(existing) = self
                .locals
                .iter()
                .find(|existing| existing.name == local.name)
            {
                diags.push(duplicate(
                    "local value",
                    &local.name,
                    existing.decl_range.as_ref(),
                    local.decl_range,
                ));
                continue;
            }
            self.locals.push(local);
        }

        diags
    }
}

impl Terraform {
    /// The settings already present win
    fn merge(&mut self, other: Terraform, diags: &mut Diagnostics) {
        if let Some(new) = other.required_version {
            match &self.required_version {
                Some(existing) if *existing != new => diags.push(
                    Diagnostic::error(
                        "Conflicting required_version",
                        format!("required_version is already set to \"{existing}\", \"{new}\" is ignored."),
                    )
                    .with_range(other.decl_range.clone()),
                ),
                Some(_) => {}
                None => self.required_version = Some(new),
            }
        }

        if let Some(backend) = other.backend {
            match &self.backend {
                Some(existing) => diags.push(
                    Diagnostic::error(
                        "Duplicate backend configuration",
                        format!(
                            "A backend was already configured{}, the \"{}\" backend is ignored.",
                            declared_at(existing.decl_range.as_ref()),
                            backend.r#type
                        ),
                    )
                    .with_range(backend.decl_range),
                ),
                None => self.backend = Some(backend),
            }
        }
    }
}

/// ` at <range>` when the range is known
fn declared_at(range: Option<&SourceRange>) -> String {
    range.map(|range| format!(" at {range}")).unwrap_or_default()
}

/// Error for a second declaration of something that must be unique
pub(crate) fn duplicate(
    kind: &str,
    name: &str,
    previous: Option<&SourceRange>,
    range: Option<SourceRange>,
) -> Diagnostic {
    let detail = match previous {
        Some(previous) => format!("A {kind} named \"{name}\" was already declared at {previous}."),
        None => format!("A {kind} named \"{name}\" was already declared."),
    };

    Diagnostic::error(format!("Duplicate {kind}"), detail).with_range(range)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document;
    use pretty_assertions::assert_eq;

    fn decode(path: &str, text: &str) -> Config {
        let decoded = document!(path => text).decode();
        assert!(decoded.diagnostics.is_empty(), "{}", decoded.diagnostics);
        decoded.config
    }

    #[test]
    fn resource_id_display() {
        let config = decode("main.tf", "resource \"aws_instance\" \"web\" {}\ndata \"aws_ami\" \"ubuntu\" {}\n");

        let ids: Vec<_> = config.resources.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["aws_instance.web", "data.aws_ami.ubuntu"]);
    }

    #[test]
    fn merge_disjoint_files() {
        let mut config = decode("a.tf", "variable \"region\" {}\nresource \"x\" \"one\" {}\n");
        let diags = config.merge(decode("b.tf", "variable \"zone\" {}\nresource \"x\" \"two\" {}\n"));

        assert!(diags.is_empty());
        assert_eq!(config.variables.len(), 2);
        assert_eq!(config.resources.len(), 2);
    }

    #[test]
    fn merge_reports_duplicates_with_first_declaration() {
        let mut config = decode("a.tf", "variable \"region\" {\n  default = \"eu\"\n}\n");
        let diags = config.merge(decode("b.tf", "variable \"region\" {\n  default = \"us\"\n}\n"));

        assert_eq!(diags.len(), 1);
        let diag = &diags.as_slice()[0];
        assert_eq!(diag.summary, "Duplicate variable");
        assert!(diag.detail.contains("a.tf:1,1"), "{}", diag.detail);
        assert_eq!(
            diag.range.as_ref().map(|range| range.file()),
            Some(std::path::Path::new("b.tf"))
        );

        assert_eq!(config.variables.len(), 1);
        assert_eq!(
            config.variables[0].default,
            Some(hcl::Expression::String("eu".into()))
        );
    }

    #[test]
    fn merge_terraform_settings() {
        let mut config = decode("a.tf", "terraform {\n  required_version = \">= 0.11\"\n}\n");
        let diags = config.merge(decode("b.tf", "terraform {\n  backend \"s3\" {}\n}\n"));
        assert!(diags.is_empty());

        let terraform = config.terraform.as_ref().expect("terraform");
        assert_eq!(terraform.required_version.as_deref(), Some(">= 0.11"));
        assert_eq!(terraform.backend.as_ref().map(|b| b.r#type.as_str()), Some("s3"));

        let diags = config.merge(decode("c.tf", "terraform {\n  required_version = \"0.12\"\n}\n"));
        assert_eq!(diags.as_slice()[0].summary, "Conflicting required_version");
    }

    #[test]
    fn providers_are_unique_by_alias() {
        let mut config = decode("a.tf", "provider \"aws\" {}\nprovider \"aws\" {\n  alias = \"west\"\n}\n");
        let diags = config.merge(decode("b.tf", "provider \"aws\" {\n  alias = \"west\"\n}\n"));

        assert_eq!(diags.len(), 1);
        assert!(diags.as_slice()[0].detail.contains("aws.west"));
    }

    #[test]
    fn terraform_conflicts_are_located() {
        let mut config = decode(
            "a.tf",
            "terraform {\n  required_version = \"1.0\"\n  backend \"s3\" {}\n}\natlas {\n  name = \"a/b\"\n}\n",
        );
        let diags = config.merge(decode(
            "b.tf",
            "atlas {\n  name = \"c/d\"\n}\n\nterraform {\n  required_version = \"2.0\"\n  backend \"local\" {}\n}\n",
        ));

        let located: Vec<_> = diags
            .iter()
            .map(|diag| {
                let range = diag.range.as_ref().expect("located");
                (diag.summary.as_str(), range.file().display().to_string(), range.start.line)
            })
            .collect();
        assert_eq!(
            located,
            vec![
                ("Conflicting required_version", "b.tf".to_string(), 5),
                ("Duplicate backend configuration", "b.tf".to_string(), 7),
                ("Duplicate atlas block", "b.tf".to_string(), 1),
            ]
        );
        assert!(diags.as_slice()[1].detail.contains("a.tf:3,3"), "{}", diags.as_slice()[1].detail);
        assert!(diags.as_slice()[2].detail.contains("a.tf:5,1"), "{}", diags.as_slice()[2].detail);

        let terraform = config.terraform.as_ref().expect("terraform");
        assert_eq!(terraform.required_version.as_deref(), Some("1.0"));
        assert_eq!(terraform.backend.as_ref().map(|b| b.r#type.as_str()), Some("s3"));
    }
}
