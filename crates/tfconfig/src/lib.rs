//! # tfconfig - terraform-style configuration decoder
//!
//! Turns `.tf` and `.tf.json` files into a canonical [config::Config] plus a list of [diagnostic::Diagnostic]s.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfconfig` works internally.
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier` (called the block type here, e.g. `resource`)
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! ```hcl
//! variable "region" {
//!   default = "eu-west-1"
//! }
//!
//! resource "aws_instance" "web" {
//!   ami   = "ami-123"
//!   count = 2
//!
//!   lifecycle {
//!     create_before_destroy = true
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! see [source::LoadSession]
//!
//! Every file is loaded through a session. The session keeps the text of each file around so diagnostics can be
//! rendered with the source they point at ([report]), also after the [source::Document] is gone.
//! Files ending in `.json` are read as JSON syntax ([json]), everything else as native syntax. At this point a file
//! only has to be syntactically valid.
//!
//! ### Shallow decode
//!
//! see [shallow::decode]
//!
//! The body is matched against a static [schema]. Only the outer shape is checked: which blocks and attributes
//! exist, their labels, and the few values that have to be static (strings, bools, lists of strings).
//! Everything provider specific stays in a [shallow::Remainder] which is decoded later by whoever knows its schema.
//!
//! ### Lowering
//!
//! see [lower::decode]
//!
//! The shallow structures are mapped to the canonical entities and uniqueness is checked
//! (one variable per name, one resource per mode/type/name, ...). When the shallow decode already failed we only
//! [lower::recover] what is needed to pick the right toolchain version.
//!
//! ### Multiple files
//!
//! Files of one module are decoded independently and combined with [config::Config::merge], which applies the same
//! uniqueness rules across files.
//!
pub mod config;
pub mod diagnostic;
pub mod json;
pub mod lower;
pub mod report;
pub mod schema;
pub mod shallow;
pub mod source;
pub mod value;

pub use lower::Decoded;
pub use source::{Document, LoadError, LoadSession};
