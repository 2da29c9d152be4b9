//! An owned, typed scene model built on top of the schema.
//!
//! Where the DNA structs chain siblings through `next`/`prev` pointers, the
//! model stores them in `Vec`s owned by their parent. Where a struct starts
//! with a base struct and a `type` tag, the model has an enum. Pointers
//! between datablocks become [`IdRef`]s that are resolved through the
//! [`Registry`], and `*_Runtime` state lives in a [`RuntimeStore`] keyed by
//! session uid instead of inside the records.
//!
//! [`IdRef`]: id::IdRef
//! [`Registry`]: registry::Registry
//! [`RuntimeStore`]: runtime::RuntimeStore

pub mod anim;
pub mod armature;
pub mod id;
pub mod mesh;
pub mod modifier;
pub mod nodes;
pub mod object;
pub mod registry;
pub mod runtime;

use crate::record::{truncate_to_boundary as truncate, Record};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("{0} name is empty")]
    EmptyName(&'static str),
    #[error("`{0}` is not a datablock code")]
    UnknownIdCode(String),
    #[error("datablock {0} does not exist")]
    MissingDatablock(String),
    #[error("`{family}` has no variant with tag {tag}")]
    UnknownVariant { family: &'static str, tag: i32 },
    #[error("record is a `{found}` but its tag says `{expected}`")]
    VariantMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("no {what} with index {index}")]
    InvalidIndex { what: &'static str, index: usize },
    #[error("`{0}` can't be its own ancestor")]
    ParentCycle(String),
    #[error("mesh is invalid: {0}")]
    InvalidMesh(String),
    #[error("sockets can't be linked: {0}")]
    InvalidLink(String),
    #[error("strip `{0}` overlaps another strip on the track")]
    StripOverlap(String),
}

/// Fails unless `record` is a `expected` record.
pub(crate) fn check_struct(record: &Record<'_>, expected: &'static str) -> Result<(), ModelError> {
    if record.type_name() == expected {
        Ok(())
    } else {
        Err(ModelError::VariantMismatch {
            expected,
            found: record.type_name().to_string(),
        })
    }
}

/// Returns `base` or the first `base.NNN` for which `taken` is false,
/// keeping the result within `max_len` bytes. A numeric suffix already on
/// `base` is replaced rather than extended.
pub(crate) fn unique_name<F: Fn(&str) -> bool>(base: &str, max_len: usize, taken: F) -> String {
    let base = truncate(base, max_len);
    if !taken(base) {
        return base.to_string();
    }

    let stem = match base.rfind('.') {
        Some(dot)
            if dot + 1 < base.len() && base[dot + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &base[..dot]
        }
        _ => base,
    };
    let mut number = 1;
    loop {
        let suffix = format!(".{:03}", number);
        let stem = truncate(stem, max_len.saturating_sub(suffix.len()));
        let candidate = format!("{}{}", stem, suffix);
        if !taken(&candidate) {
            return candidate;
        }
        number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_names() {
        let taken = ["Cube", "Cube.001"];
        assert_eq!(unique_name("Sphere", 63, |n| taken.contains(&n)), "Sphere");
        assert_eq!(unique_name("Cube", 63, |n| taken.contains(&n)), "Cube.002");
        assert_eq!(unique_name("Cube.001", 63, |n| taken.contains(&n)), "Cube.002");
        assert_eq!(unique_name("v1.5", 63, |n| n == "v1.5"), "v1.001");
    }

    #[test]
    fn long_names_make_room_for_suffix() {
        let name = "a".repeat(10);
        let unique = unique_name(&name, 10, |n| n == name);
        assert_eq!(unique, "aaaaaa.001");
    }
}
