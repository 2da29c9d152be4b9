//! # blend_dna - Blender's DNA struct layouts as data
//!
//! Blender saves a scene by dumping its in-memory structs to disk, and describes
//! those structs in a schema called DNA. This crate carries that schema as
//! declarations, checks that every struct has the same byte layout on 32 and
//! 64 bit machines, encodes the schema as an SDNA block, and reads and writes
//! single records by field name.
//!
//! ## Example
//!
//! ```
//! use blend_dna::{Catalog, RecordBuf, Target};
//!
//! let catalog = Catalog::builtin().unwrap();
//! let layouts = catalog.layouts(Target::LITTLE_64).unwrap();
//!
//! let mut vert = RecordBuf::zeroed(&layouts, "MVert").unwrap();
//! vert.as_mut().set_slice("co", &[1.0f32, 2.0, 3.0]).unwrap();
//!
//! let co: [f32; 3] = vert.as_record().get_f32_array("co").unwrap();
//! assert_eq!(co, [1.0, 2.0, 3.0]);
//! assert_eq!(layouts.get("Object").unwrap().size, 1440);
//! ```
//!
//! ## Layers
//!
//! * [`parsers`] reads declaration text, field names and SDNA blocks.
//! * [`schema`] holds the structs and the relations between them.
//! * [`layout`] computes offsets for a [`Target`] and enforces the layout rules.
//! * [`record`] views the bytes of one struct instance.
//! * [`catalog`] is the built-in schema, one declaration file per domain.
//! * [`model`] is an owned scene model: `Vec`s instead of linked lists, enums
//!   instead of base-struct prefixes, and weak references between datablocks.
//!
//! There is no reader for whole `.blend` files here: no file header, no block
//! list and no pointer relocation.

pub mod catalog;
mod error;
pub mod layout;
pub mod model;
pub mod parsers;
pub mod record;
pub mod schema;

pub use catalog::{Catalog, Domain};
pub use error::{Error, Result};
pub use layout::Layouts;
pub use parsers::{Endianness, PointerSize, Target};
pub use record::{Record, RecordBuf};
pub use schema::Schema;
