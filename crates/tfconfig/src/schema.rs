//! static block grammar for the shallow decode
//!
//! Every block kind is described once by a [BlockSchema]: its labels, the attributes it accepts, the blocks that
//! may be nested inside and what happens with everything else ([Remain]).
//! [crate::shallow] walks a body against these descriptions, [crate::json] uses them to tell blocks from attributes.

#[derive(Debug)]
pub struct BlockSchema {
    /// Block identifier, `""` for the top level body
    pub kind: &'static str,
    pub labels: &'static [&'static str],
    pub attributes: &'static [AttributeSchema],
    pub blocks: &'static [NestedBlock],
    pub remain: Remain,
}

#[derive(Debug)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

#[derive(Debug)]
pub struct NestedBlock {
    pub schema: &'static BlockSchema,
    pub repeat: Repeat,
}

/// Primitive kind an attribute value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Bool,
    StringList,
    /// Any expression, kept unevaluated
    Expression,
}

impl ValueKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::StringList => "list of string",
            ValueKind::Expression => "expression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// 0..1
    Optional,
    /// 0..n
    Many,
}

/// What happens with attributes and blocks the schema does not name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remain {
    /// rejected
    None,
    /// forwarded as an opaque body
    Body,
    /// attributes are collected, blocks are rejected
    Attributes,
}

impl BlockSchema {
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSchema> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn block(&self, kind: &str) -> Option<&'static NestedBlock> {
        self.blocks.iter().find(|block| block.schema.kind == kind)
    }

    pub fn required_attributes(&self) -> impl Iterator<Item = &'static AttributeSchema> {
        self.attributes.iter().filter(|attr| attr.required)
    }
}

const fn required(name: &'static str, kind: ValueKind) -> AttributeSchema {
    AttributeSchema {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ValueKind) -> AttributeSchema {
    AttributeSchema {
        name,
        kind,
        required: false,
    }
}

const fn one(schema: &'static BlockSchema) -> NestedBlock {
    NestedBlock {
        schema,
        repeat: Repeat::Optional,
    }
}

const fn many(schema: &'static BlockSchema) -> NestedBlock {
    NestedBlock {
        schema,
        repeat: Repeat::Many,
    }
}

pub static TOP_LEVEL: BlockSchema = BlockSchema {
    kind: "",
    labels: &[],
    attributes: &[],
    blocks: &[
        one(&ATLAS),
        many(&DATA),
        many(&MODULE),
        many(&OUTPUT),
        many(&PROVIDER),
        many(&RESOURCE),
        one(&TERRAFORM),
        many(&VARIABLE),
        many(&LOCALS),
    ],
    remain: Remain::None,
};

pub static TERRAFORM: BlockSchema = BlockSchema {
    kind: "terraform",
    labels: &[],
    attributes: &[optional("required_version", ValueKind::String)],
    blocks: &[one(&BACKEND)],
    remain: Remain::None,
};

pub static BACKEND: BlockSchema = BlockSchema {
    kind: "backend",
    labels: &["type"],
    attributes: &[],
    blocks: &[],
    remain: Remain::Body,
};

pub static ATLAS: BlockSchema = BlockSchema {
    kind: "atlas",
    labels: &[],
    attributes: &[
        required("name", ValueKind::String),
        optional("include", ValueKind::StringList),
        optional("exclude", ValueKind::StringList),
    ],
    blocks: &[],
    remain: Remain::None,
};

pub static MODULE: BlockSchema = BlockSchema {
    kind: "module",
    labels: &["name"],
    attributes: &[required("source", ValueKind::String)],
    blocks: &[],
    remain: Remain::Body,
};

pub static PROVIDER: BlockSchema = BlockSchema {
    kind: "provider",
    labels: &["name"],
    attributes: &[
        optional("alias", ValueKind::String),
        optional("version", ValueKind::String),
    ],
    blocks: &[],
    remain: Remain::Body,
};

static RESOURCE_ATTRIBUTES: [AttributeSchema; 3] = [
    optional("count", ValueKind::Expression),
    optional("provider", ValueKind::String),
    optional("depends_on", ValueKind::StringList),
];

static RESOURCE_BLOCKS: [NestedBlock; 2] = [one(&LIFECYCLE), many(&PROVISIONER)];

pub static RESOURCE: BlockSchema = BlockSchema {
    kind: "resource",
    labels: &["type", "name"],
    attributes: &RESOURCE_ATTRIBUTES,
    blocks: &RESOURCE_BLOCKS,
    remain: Remain::Body,
};

/// Same shape as [RESOURCE]
pub static DATA: BlockSchema = BlockSchema {
    kind: "data",
    labels: &["type", "name"],
    attributes: &RESOURCE_ATTRIBUTES,
    blocks: &RESOURCE_BLOCKS,
    remain: Remain::Body,
};

pub static LIFECYCLE: BlockSchema = BlockSchema {
    kind: "lifecycle",
    labels: &[],
    attributes: &[
        optional("create_before_destroy", ValueKind::Bool),
        optional("prevent_destroy", ValueKind::Bool),
        optional("ignore_changes", ValueKind::StringList),
    ],
    blocks: &[],
    remain: Remain::None,
};

pub static PROVISIONER: BlockSchema = BlockSchema {
    kind: "provisioner",
    labels: &["type"],
    attributes: &[
        optional("when", ValueKind::String),
        optional("on_failure", ValueKind::String),
    ],
    blocks: &[one(&CONNECTION)],
    remain: Remain::Body,
};

pub static CONNECTION: BlockSchema = BlockSchema {
    kind: "connection",
    labels: &[],
    attributes: &[],
    blocks: &[],
    remain: Remain::Body,
};

pub static VARIABLE: BlockSchema = BlockSchema {
    kind: "variable",
    labels: &["name"],
    attributes: &[
        optional("type", ValueKind::String),
        optional("default", ValueKind::Expression),
        optional("description", ValueKind::String),
        optional("sensitive", ValueKind::Bool),
    ],
    blocks: &[],
    remain: Remain::None,
};

pub static OUTPUT: BlockSchema = BlockSchema {
    kind: "output",
    labels: &["name"],
    attributes: &[
        required("value", ValueKind::Expression),
        optional("depends_on", ValueKind::StringList),
        optional("description", ValueKind::String),
        optional("sensitive", ValueKind::Bool),
    ],
    blocks: &[],
    remain: Remain::None,
};

pub static LOCALS: BlockSchema = BlockSchema {
    kind: "locals",
    labels: &[],
    attributes: &[],
    blocks: &[],
    remain: Remain::Attributes,
};
