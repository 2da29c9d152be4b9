//! Byte layouts of schema structs for a given pointer size, and the
//! alignment rules a layout must follow to be identical on every platform.
//!
//! Fields are packed one after the other, the compiler must never have to
//! insert padding. Padding that is needed is declared explicitly with `_pad`
//! fields, so the rules here only check that the declared offsets are
//! already aligned:
//!
//! * pointers (and function pointers) sit on a multiple of the pointer size,
//! * `int`, `float`, `short`, `double` and the 64 bit integers on a multiple
//!   of their own size,
//! * embedded structs on a multiple of 8 on 64 bit targets and of
//!   `max(4, struct alignment)` on 32 bit targets,
//! * a struct size is a multiple of 4 (sizes 1 and 2 excepted) and of its
//!   own alignment,
//! * `long` is never used and `void` only behind a pointer.
//!
//! Violations report how many bytes of padding fix them.

use crate::{
    parsers::{field::FieldInfo, primitive::Primitive, PointerSize, Target},
    schema::{FieldRole, Schema, SchemaError, StructDef},
};
use linked_hash_map::LinkedHashMap;
use log::{debug, warn};
use serde::Serialize;
use std::{collections::HashMap, fmt};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("{} layout violation(s), first: {}", .0.len(), .0[0])]
    Violations(Vec<Violation>),
}

/// What is stored in a field, after resolving its type name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Primitive(Primitive),
    Struct,
    Pointer,
    FnPointer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldLayout {
    pub ident: String,
    pub name: String,
    pub type_name: String,
    pub kind: FieldKind,
    pub role: FieldRole,
    pub offset: usize,
    pub size: usize,
    /// Size of one element, `size / count`.
    pub element_size: usize,
    pub count: usize,
    pub is_array: bool,
    /// Natural alignment of the element type.
    pub align: usize,
}

impl FieldLayout {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }

    pub fn is_pointer(&self) -> bool {
        self.kind == FieldKind::Pointer || self.kind == FieldKind::FnPointer
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructLayout {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub fields: Vec<FieldLayout>,
}

impl StructLayout {
    pub fn field(&self, ident: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.ident == ident)
    }
}

impl fmt::Display for StructLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "struct {} ({} bytes, align {})",
            self.name, self.size, self.align
        )?;
        for field in &self.fields {
            let marker = match field.role {
                FieldRole::Persisted => "",
                FieldRole::Padding => "  [pad]",
                FieldRole::Runtime => "  [runtime]",
            };
            writeln!(
                f,
                "  {:>6} {:>6}  {} {}{}",
                field.offset, field.size, field.type_name, field.name, marker
            )?;
        }
        Ok(())
    }
}

/// The rule a [`Violation`] breaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// The field must start at a multiple of this many bytes.
    FieldAlignment(usize),
    /// An embedded struct must start at a multiple of this many bytes.
    StructAlignment(usize),
    /// The struct size must be a multiple of this many bytes.
    SizeMultiple(usize),
    PlatformDependentType,
    VoidValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub struct_name: String,
    pub field: Option<String>,
    pub pointer_size: PointerSize,
    pub rule: Rule,
    /// Padding that fixes the violation, before the field or at the end of the struct.
    pub add_bytes: usize,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{} ({}): ", self.struct_name, field, self.pointer_size)?,
            None => write!(f, "{} ({}): ", self.struct_name, self.pointer_size)?,
        }
        match self.rule {
            Rule::FieldAlignment(n) => write!(
                f,
                "field must be {}-byte aligned, add {} bytes before it",
                n, self.add_bytes
            ),
            Rule::StructAlignment(n) => write!(
                f,
                "embedded struct must be {}-byte aligned, add {} bytes before it",
                n, self.add_bytes
            ),
            Rule::SizeMultiple(n) => write!(
                f,
                "size must be a multiple of {}, add {} bytes at the end",
                n, self.add_bytes
            ),
            Rule::PlatformDependentType => {
                f.write_str("`long` changes size between platforms, use int or int64_t")
            }
            Rule::VoidValue => f.write_str("`void` can only be used behind a pointer"),
        }
    }
}

/// Computed layouts of every struct of a schema for one target.
#[derive(Debug, Clone)]
pub struct Layouts {
    target: Target,
    structs: LinkedHashMap<String, StructLayout>,
}

struct LayoutBuilder<'s> {
    schema: &'s Schema,
    pointer_bytes: usize,
    done: HashMap<String, StructLayout>,
    visiting: Vec<&'s str>,
}

impl<'s> LayoutBuilder<'s> {
    fn build(&mut self, def: &'s StructDef) -> Result<(usize, usize), SchemaError> {
        if let Some(layout) = self.done.get(&def.name) {
            return Ok((layout.size, layout.align));
        }
        if self.visiting.contains(&def.name.as_str()) {
            let mut path: Vec<String> = self.visiting.iter().map(|s| s.to_string()).collect();
            path.push(def.name.clone());
            return Err(SchemaError::Recursive { path });
        }
        let schema = self.schema;

        self.visiting.push(&def.name);
        let ps = self.pointer_bytes;
        let mut offset = 0;
        let mut align = 1;
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let (kind, element_size, field_align) = match field.info {
                FieldInfo::Pointer { .. } | FieldInfo::PointerArray { .. } => {
                    (FieldKind::Pointer, ps, ps)
                }
                FieldInfo::FnPointer => (FieldKind::FnPointer, ps, ps),
                FieldInfo::Value | FieldInfo::ValueArray { .. } => {
                    match Primitive::from_name(&field.type_name) {
                        Some(p) => {
                            let size = p.size(ps);
                            (FieldKind::Primitive(p), size, size.max(1))
                        }
                        None => match schema.get(&field.type_name) {
                            Some(inner) => {
                                let (size, inner_align) = self.build(inner)?;
                                (FieldKind::Struct, size, inner_align)
                            }
                            None => {
                                return Err(SchemaError::UnknownType {
                                    struct_name: def.name.clone(),
                                    field: field.ident.clone(),
                                    type_name: field.type_name.clone(),
                                })
                            }
                        },
                    }
                }
            };
            let count = field.info.element_count();
            let size = element_size * count;
            fields.push(FieldLayout {
                ident: field.ident.clone(),
                name: field.name.clone(),
                type_name: field.type_name.clone(),
                kind,
                role: field.role,
                offset,
                size,
                element_size,
                count,
                is_array: field.info.is_array(),
                align: field_align,
            });
            offset += size;
            align = align.max(field_align);
        }
        self.visiting.pop();

        let layout = StructLayout {
            name: def.name.clone(),
            size: offset,
            align,
            fields,
        };
        self.done.insert(def.name.clone(), layout);
        Ok((offset, align))
    }
}

impl Layouts {
    /// Lays out every struct of `schema`. Fails only if a struct can't be
    /// laid out at all; rule violations are reported by [`Layouts::violations`].
    pub fn compute(schema: &Schema, target: Target) -> Result<Layouts, SchemaError> {
        let mut builder = LayoutBuilder {
            schema,
            pointer_bytes: target.pointer_size.bytes_num(),
            done: HashMap::with_capacity(schema.len()),
            visiting: Vec::new(),
        };
        for def in schema.structs() {
            builder.build(def)?;
        }

        let mut structs = LinkedHashMap::new();
        for name in schema.struct_names() {
            if let Some(layout) = builder.done.remove(name) {
                structs.insert(name.to_string(), layout);
            }
        }
        debug!(
            "computed {} layouts for {} pointers",
            structs.len(),
            target.pointer_size
        );
        Ok(Layouts { target, structs })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructLayout> {
        self.structs.values()
    }

    /// Checks every struct against the alignment rules for this target.
    pub fn violations(&self) -> Vec<Violation> {
        let ps = self.target.pointer_size;
        let mut out = Vec::new();
        for layout in self.iter() {
            for field in &layout.fields {
                let violation = |rule, add_bytes| Violation {
                    struct_name: layout.name.clone(),
                    field: Some(field.ident.clone()),
                    pointer_size: ps,
                    rule,
                    add_bytes,
                };
                let rule = match field.kind {
                    FieldKind::Pointer | FieldKind::FnPointer => {
                        Rule::FieldAlignment(ps.bytes_num())
                    }
                    FieldKind::Primitive(p) if p.is_platform_dependent() => {
                        out.push(violation(Rule::PlatformDependentType, 0));
                        continue;
                    }
                    FieldKind::Primitive(Primitive::Void) => {
                        out.push(violation(Rule::VoidValue, 0));
                        continue;
                    }
                    FieldKind::Primitive(_) => Rule::FieldAlignment(field.element_size),
                    FieldKind::Struct => match ps {
                        PointerSize::Bits64 => Rule::StructAlignment(8),
                        PointerSize::Bits32 => Rule::StructAlignment(field.align.max(4)),
                    },
                };
                let required = match rule {
                    Rule::FieldAlignment(n) | Rule::StructAlignment(n) => n,
                    _ => 1,
                };
                let misalignment = field.offset % required;
                if misalignment != 0 {
                    out.push(violation(rule, required - misalignment));
                }
            }

            let size_rule = if layout.size % 4 != 0 && layout.size != 1 && layout.size != 2 {
                Some(4)
            } else if layout.size % layout.align != 0 {
                Some(layout.align)
            } else {
                None
            };
            if let Some(multiple) = size_rule {
                out.push(Violation {
                    struct_name: layout.name.clone(),
                    field: None,
                    pointer_size: ps,
                    rule: Rule::SizeMultiple(multiple),
                    add_bytes: multiple - layout.size % multiple,
                });
            }
        }
        out
    }

    /// A serializable view of the given structs, or of all of them if `names` is empty.
    pub fn report<'a>(&'a self, names: &[String]) -> LayoutReport<'a> {
        let structs = if names.is_empty() {
            self.iter().collect()
        } else {
            names.iter().filter_map(|n| self.get(n)).collect()
        };
        LayoutReport {
            target: self.target,
            structs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LayoutReport<'a> {
    pub target: Target,
    pub structs: Vec<&'a StructLayout>,
}

/// Checks `schema` against the alignment rules for both pointer sizes.
pub fn validate(schema: &Schema) -> Result<(), LayoutError> {
    let mut violations = Vec::new();
    for target in [Target::LITTLE_32, Target::LITTLE_64].iter() {
        violations.extend(Layouts::compute(schema, *target)?.violations());
    }
    if violations.is_empty() {
        Ok(())
    } else {
        for v in &violations {
            warn!("{}", v);
        }
        Err(LayoutError::Violations(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layouts(source: &str, target: Target) -> Layouts {
        Layouts::compute(&Schema::parse(source).unwrap(), target).unwrap()
    }

    #[test]
    fn offsets_are_sequential() {
        let source = "
            struct ListBase { void *first, *last; };
            struct Thing { ListBase list; int flag; char name[12]; float *co; };
        ";
        let l64 = layouts(source, Target::LITTLE_64);
        let thing = l64.get("Thing").unwrap();
        let offsets: Vec<_> = thing.fields.iter().map(|f| (f.offset, f.size)).collect();
        assert_eq!(offsets, vec![(0, 16), (16, 4), (20, 12), (32, 8)]);
        assert_eq!(thing.size, 40);
        assert_eq!(thing.align, 8);

        let l32 = layouts(source, Target::LITTLE_32);
        assert_eq!(l32.get("Thing").unwrap().size, 28);
        assert!(l32.violations().is_empty());
        assert!(l64.violations().is_empty());
    }

    #[test]
    fn misaligned_pointer() {
        let source = "struct A { int flag; void *data; int x; };";
        let l = layouts(source, Target::LITTLE_64);
        let v = l.violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field.as_deref(), Some("data"));
        assert_eq!(v[0].rule, Rule::FieldAlignment(8));
        assert_eq!(v[0].add_bytes, 4);
        assert_eq!(
            v[0].to_string(),
            "A.data (64-bit): field must be 8-byte aligned, add 4 bytes before it"
        );
        assert!(layouts(source, Target::LITTLE_32)
            .violations()
            .is_empty());
    }

    #[test]
    fn embedded_struct_alignment() {
        let source = "
            struct V { float x, y; };
            struct A { int flag; V v; };
        ";
        let v64 = layouts(source, Target::LITTLE_64).violations();
        assert_eq!(v64.len(), 1);
        assert_eq!(v64[0].rule, Rule::StructAlignment(8));
        assert!(layouts(source, Target::LITTLE_32).violations().is_empty());
    }

    #[test]
    fn size_must_be_multiple_of_4() {
        let v = layouts("struct A { int a; char c[3]; };", Target::LITTLE_64).violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, None);
        assert_eq!(v[0].rule, Rule::SizeMultiple(4));
        assert_eq!(v[0].add_bytes, 1);

        // two byte structs are allowed
        assert!(layouts("struct B { char a, b; };", Target::LITTLE_64)
            .violations()
            .is_empty());

        let v = layouts("struct C { double d; int i; };", Target::LITTLE_32).violations();
        assert_eq!(v[0].rule, Rule::SizeMultiple(8));
    }

    #[test]
    fn long_is_rejected() {
        let err = validate(&Schema::parse("struct A { long a; };").unwrap()).unwrap_err();
        match err {
            LayoutError::Violations(v) => {
                assert_eq!(v.len(), 2);
                assert!(v.iter().all(|v| v.rule == Rule::PlatformDependentType));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn function_pointers_are_pointer_sized() {
        let l = layouts("struct A { void (*cb)(); int x; char _pad[4]; };", Target::LITTLE_64);
        let a = l.get("A").unwrap();
        assert_eq!(a.field("cb").unwrap().kind, FieldKind::FnPointer);
        assert_eq!(a.size, 16);
        assert_eq!(a.field("_pad").unwrap().role, FieldRole::Padding);
    }

    #[test]
    fn report_serializes() {
        let l = layouts("struct A { int x; };", Target::LITTLE_32);
        let json = serde_json::to_value(l.report(&[])).unwrap();
        assert_eq!(json["structs"][0]["name"], "A");
        assert_eq!(json["structs"][0]["fields"][0]["kind"]["primitive"], "int");
        assert_eq!(json["target"]["pointer_size"], "Bits32");
    }
}
