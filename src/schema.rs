//! The DNA schema: every struct, its fields in declaration order and what
//! each field is for.

use crate::{
    layout::Layouts,
    parsers::{
        decl::{parse_declarations, FieldDecl, StructDecl},
        field::{parse_field_name, FieldInfo, FieldParseError},
        primitive::Primitive,
        sdna::{Dna, DnaField, DnaStruct, DnaType},
        Endianness, PointerSize, Target,
    },
    Error,
};
use linked_hash_map::LinkedHashMap;
use log::debug;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("struct `{0}` is declared twice")]
    DuplicateStruct(String),
    #[error("`{struct_name}` declares `{field}` twice")]
    DuplicateField { struct_name: String, field: String },
    #[error("`{struct_name}.{field}` has unknown type `{type_name}`")]
    UnknownType {
        struct_name: String,
        field: String,
        type_name: String,
    },
    #[error("`{struct_name}.{field}` stores `void` by value")]
    VoidValue { struct_name: String, field: String },
    #[error("struct embeds itself: {}", .path.join(" -> "))]
    Recursive { path: Vec<String> },
    #[error("`{struct_name}` has invalid field name `{name}`: {source}")]
    InvalidField {
        struct_name: String,
        name: String,
        source: FieldParseError,
    },
    #[error("SDNA {what} index {index} is out of range")]
    InvalidIndex { what: &'static str, index: usize },
    #[error("`{struct_name}` is stored as {stored} bytes but its fields add up to {computed}")]
    SizeMismatch {
        struct_name: String,
        stored: usize,
        computed: usize,
    },
}

/// What a field is for. Only persisted fields carry data between sessions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Persisted,
    /// Explicit alignment filler, named `_pad*`. Its content is meaningless.
    Padding,
    /// Session-only state. Its bytes are zeroed on write and ignored on read.
    Runtime,
}

impl FieldRole {
    pub fn classify(type_name: &str, ident: &str, marked_runtime: bool) -> FieldRole {
        if marked_runtime || is_runtime_type(type_name) {
            FieldRole::Runtime
        } else if ident.starts_with("_pad") {
            FieldRole::Padding
        } else {
            FieldRole::Persisted
        }
    }
}

/// Runtime companion structs are named `<Owner>_Runtime` (or `<Owner>Runtime`).
pub fn is_runtime_type(type_name: &str) -> bool {
    type_name.ends_with("Runtime")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub type_name: String,
    /// Full DNA name, `*next` or `mat[4][4]`.
    pub name: String,
    /// Bare identifier, `next` or `mat`.
    pub ident: String,
    pub info: FieldInfo,
    pub role: FieldRole,
}

impl FieldDef {
    pub fn new(
        struct_name: &str,
        type_name: &str,
        name: &str,
        marked_runtime: bool,
    ) -> Result<FieldDef, SchemaError> {
        let (ident, info) =
            parse_field_name(name).map_err(|source| SchemaError::InvalidField {
                struct_name: struct_name.to_string(),
                name: name.to_string(),
                source,
            })?;
        Ok(FieldDef {
            type_name: type_name.to_string(),
            name: name.to_string(),
            ident: ident.to_string(),
            role: FieldRole::classify(type_name, ident, marked_runtime),
            info,
        })
    }

    /// True for fields that store another struct inline.
    pub fn is_embedded(&self) -> bool {
        !self.info.is_pointer() && Primitive::from_name(&self.type_name).is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn field(&self, ident: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.ident == ident)
    }

    /// The struct embedded as the first field, if any. A struct whose first
    /// field is an embedded struct may be viewed as that struct.
    pub fn base(&self) -> Option<&FieldDef> {
        self.fields
            .first()
            .filter(|f| f.is_embedded() && !f.info.is_array())
    }

    fn to_decl(&self) -> StructDecl {
        StructDecl {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldDecl {
                    type_name: f.type_name.clone(),
                    name: f.name.clone(),
                    runtime: f.role == FieldRole::Runtime && !is_runtime_type(&f.type_name),
                })
                .collect(),
        }
    }
}

/// What a type name refers to.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TypeRef<'a> {
    Primitive(Primitive),
    Struct(&'a StructDef),
    /// A type only ever used behind a pointer.
    Opaque,
}

/// An ordered set of struct definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    structs: LinkedHashMap<String, StructDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from parsed declarations without checking that every
    /// embedded type is declared. See [`Schema::check`].
    pub fn from_decls(decls: Vec<StructDecl>) -> Result<Schema, SchemaError> {
        let mut schema = Schema::new();
        for decl in decls {
            let mut fields = Vec::with_capacity(decl.fields.len());
            let mut seen = HashSet::new();
            for field in &decl.fields {
                let def = FieldDef::new(&decl.name, &field.type_name, &field.name, field.runtime)?;
                if !seen.insert(def.ident.clone()) {
                    return Err(SchemaError::DuplicateField {
                        struct_name: decl.name,
                        field: def.ident,
                    });
                }
                fields.push(def);
            }
            schema.insert(StructDef {
                name: decl.name,
                fields,
            })?;
        }
        Ok(schema)
    }

    /// Parses declaration text without cross-checking types.
    pub fn from_source(text: &str) -> Result<Schema, Error> {
        Ok(Schema::from_decls(parse_declarations(text)?)?)
    }

    /// Parses declaration text and checks it is self-contained.
    pub fn parse(text: &str) -> Result<Schema, Error> {
        let schema = Schema::from_source(text)?;
        schema.check()?;
        Ok(schema)
    }

    pub fn insert(&mut self, def: StructDef) -> Result<(), SchemaError> {
        if self.structs.contains_key(&def.name) {
            return Err(SchemaError::DuplicateStruct(def.name));
        }
        self.structs.insert(def.name.clone(), def);
        Ok(())
    }

    /// Appends every struct of `other`. Fails without modifying `self` if a
    /// name is declared in both.
    pub fn merge(&mut self, other: Schema) -> Result<(), SchemaError> {
        if let Some(name) = other.structs.keys().find(|n| self.structs.contains_key(*n)) {
            return Err(SchemaError::DuplicateStruct(name.clone()));
        }
        for (name, def) in other.structs {
            self.structs.insert(name, def);
        }
        Ok(())
    }

    /// Checks that every field stored by value has a known type and that no
    /// struct contains itself.
    pub fn check(&self) -> Result<(), SchemaError> {
        for def in self.structs() {
            for field in &def.fields {
                if field.info.is_pointer() {
                    continue;
                }
                match self.type_ref(&field.type_name) {
                    TypeRef::Primitive(Primitive::Void) => {
                        return Err(SchemaError::VoidValue {
                            struct_name: def.name.clone(),
                            field: field.ident.clone(),
                        })
                    }
                    TypeRef::Opaque => {
                        return Err(SchemaError::UnknownType {
                            struct_name: def.name.clone(),
                            field: field.ident.clone(),
                            type_name: field.type_name.clone(),
                        })
                    }
                    _ => {}
                }
            }
        }

        let mut done = HashSet::new();
        for def in self.structs() {
            let mut path = Vec::new();
            self.check_embedding(def, &mut path, &mut done)?;
        }
        debug!("schema with {} structs checked", self.len());
        Ok(())
    }

    fn check_embedding<'a>(
        &'a self,
        def: &'a StructDef,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), SchemaError> {
        if done.contains(def.name.as_str()) {
            return Ok(());
        }
        if path.contains(&def.name.as_str()) {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(def.name.clone());
            return Err(SchemaError::Recursive { path: cycle });
        }
        path.push(&def.name);
        for field in def.fields.iter().filter(|f| f.is_embedded()) {
            if let Some(inner) = self.get(&field.type_name) {
                self.check_embedding(inner, path, done)?;
            }
        }
        path.pop();
        done.insert(&def.name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Structs in declaration order.
    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.structs.values()
    }

    pub fn struct_names(&self) -> impl Iterator<Item = &str> {
        self.structs.keys().map(String::as_str)
    }

    pub fn type_ref(&self, type_name: &str) -> TypeRef<'_> {
        if let Some(p) = Primitive::from_name(type_name) {
            TypeRef::Primitive(p)
        } else if let Some(def) = self.get(type_name) {
            TypeRef::Struct(def)
        } else {
            TypeRef::Opaque
        }
    }

    /// Every struct whose first field embeds `base`, directly or through
    /// another variant.
    pub fn variants_of(&self, base: &str) -> Vec<&StructDef> {
        self.structs()
            .filter(|def| def.name != base && self.extends(def, base))
            .collect()
    }

    /// True if `def` is `base` or starts with it.
    pub fn extends(&self, def: &StructDef, base: &str) -> bool {
        let mut current = def;
        let mut steps = 0;
        loop {
            if current.name == base {
                return true;
            }
            match current.base().and_then(|f| self.get(&f.type_name)) {
                Some(next) if steps < self.len() => {
                    current = next;
                    steps += 1;
                }
                _ => return false,
            }
        }
    }

    /// Fields anywhere in the schema that point at or embed `name`.
    pub fn references_of(&self, name: &str) -> Vec<(&StructDef, &FieldDef)> {
        self.structs()
            .flat_map(|def| {
                def.fields
                    .iter()
                    .filter(move |f| f.type_name == name)
                    .map(move |f| (def, f))
            })
            .collect()
    }

    /// Type names used behind pointers but never declared.
    pub fn opaque_types(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for def in self.structs() {
            for field in &def.fields {
                let name = field.type_name.as_str();
                if let TypeRef::Opaque = self.type_ref(name) {
                    if seen.insert(name) {
                        out.push(name);
                    }
                }
            }
        }
        out
    }

    /// Renders the schema back to declaration text.
    pub fn to_source(&self) -> String {
        self.structs()
            .map(|def| def.to_decl().to_source())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Builds the SDNA tables for `layouts`. The type table lists the
    /// primitives first, then every struct, then the opaque types.
    pub fn to_dna(&self, layouts: &Layouts) -> Result<Dna, SchemaError> {
        let pointer_bytes = layouts.target().pointer_size.bytes_num();
        let mut types = Vec::new();
        let mut type_index = LinkedHashMap::new();
        for p in Primitive::ALL.iter() {
            type_index.insert(p.name().to_string(), types.len());
            types.push(DnaType {
                name: p.name().to_string(),
                bytes_len: p.size(pointer_bytes),
            });
        }
        for def in self.structs() {
            let size = layouts.get(&def.name).map(|l| l.size).unwrap_or(0);
            type_index.insert(def.name.clone(), types.len());
            types.push(DnaType {
                name: def.name.clone(),
                bytes_len: size,
            });
        }
        for name in self.opaque_types() {
            type_index.insert(name.to_string(), types.len());
            types.push(DnaType {
                name: name.to_string(),
                bytes_len: 0,
            });
        }

        let mut names = Vec::new();
        let mut name_index: LinkedHashMap<String, usize> = LinkedHashMap::new();
        let mut structs = Vec::with_capacity(self.len());
        for def in self.structs() {
            let mut fields = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                let index = match name_index.get(&field.name) {
                    Some(i) => *i,
                    None => {
                        name_index.insert(field.name.clone(), names.len());
                        names.push(field.name.clone());
                        names.len() - 1
                    }
                };
                fields.push(DnaField {
                    type_index: type_index[&field.type_name],
                    name_index: index,
                });
            }
            structs.push(DnaStruct {
                type_index: type_index[&def.name],
                fields,
            });
        }

        Ok(Dna {
            names,
            types,
            structs,
        })
    }

    /// Rebuilds a schema from SDNA tables and checks that the stored struct
    /// sizes agree with the layout computed for `pointer_size`.
    pub fn from_dna(dna: &Dna, pointer_size: PointerSize) -> Result<Schema, SchemaError> {
        let type_name = |index: usize| {
            dna.type_name(index).ok_or(SchemaError::InvalidIndex {
                what: "type",
                index,
            })
        };

        let mut schema = Schema::new();
        for s in &dna.structs {
            let struct_name = type_name(s.type_index)?;
            let mut fields = Vec::with_capacity(s.fields.len());
            for f in &s.fields {
                let name = dna.name(f.name_index).ok_or(SchemaError::InvalidIndex {
                    what: "name",
                    index: f.name_index,
                })?;
                fields.push(FieldDef::new(
                    struct_name,
                    type_name(f.type_index)?,
                    name,
                    false,
                )?);
            }
            schema.insert(StructDef {
                name: struct_name.to_string(),
                fields,
            })?;
        }
        schema.check()?;

        let layouts = Layouts::compute(&schema, Target::new(pointer_size, Endianness::Little))?;
        for s in &dna.structs {
            let stored = &dna.types[s.type_index];
            if let Some(layout) = layouts.get(&stored.name) {
                if layout.size != stored.bytes_len {
                    return Err(SchemaError::SizeMismatch {
                        struct_name: stored.name.clone(),
                        stored: stored.bytes_len,
                        computed: layout.size,
                    });
                }
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "
        struct Link { struct Link *next, *prev; };
        struct ListBase { void *first, *last; };
        struct ModifierData {
          struct ModifierData *next, *prev;
          int type, mode;
          char name[64];
          DNA_RUNTIME void *runtime;
        };
        struct MirrorModifierData {
          ModifierData modifier;
          short axis;
          short flag;
          float tolerance;
          struct Object *mirror_ob;
        };
        struct Thing_Runtime { int count; char _pad[4]; };
        struct Thing {
          ListBase modifiers;
          Thing_Runtime runtime;
          char _pad0[4];
          int flag;
        };
    ";

    #[test]
    fn roles_are_classified() {
        let schema = Schema::parse(SOURCE).unwrap();
        let modifier = schema.get("ModifierData").unwrap();
        assert_eq!(modifier.field("runtime").unwrap().role, FieldRole::Runtime);
        assert_eq!(modifier.field("name").unwrap().role, FieldRole::Persisted);

        let thing = schema.get("Thing").unwrap();
        assert_eq!(thing.field("runtime").unwrap().role, FieldRole::Runtime);
        assert_eq!(thing.field("_pad0").unwrap().role, FieldRole::Padding);
        assert_eq!(thing.field("flag").unwrap().role, FieldRole::Persisted);
    }

    #[test]
    fn variants_and_references() {
        let schema = Schema::parse(SOURCE).unwrap();
        let variants: Vec<_> = schema
            .variants_of("ModifierData")
            .into_iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(variants, vec!["MirrorModifierData"]);

        let refs: Vec<_> = schema
            .references_of("Link")
            .into_iter()
            .map(|(d, f)| format!("{}.{}", d.name, f.ident))
            .collect();
        assert_eq!(refs, vec!["Link.next", "Link.prev"]);
        assert_eq!(schema.opaque_types(), vec!["Object"]);
        assert_eq!(
            schema
                .get("MirrorModifierData")
                .unwrap()
                .base()
                .map(|f| f.type_name.as_str()),
            Some("ModifierData")
        );
    }

    #[test]
    fn duplicate_struct_and_field() {
        assert!(matches!(
            Schema::parse("struct A { int a; }; struct A { int b; };"),
            Err(Error::Schema(SchemaError::DuplicateStruct(name))) if name == "A"
        ));
        assert!(matches!(
            Schema::parse("struct A { int a; float a[2]; };"),
            Err(Error::Schema(SchemaError::DuplicateField { .. }))
        ));
    }

    #[test]
    fn unknown_value_type_and_void() {
        assert!(matches!(
            Schema::parse("struct A { Missing m; };"),
            Err(Error::Schema(SchemaError::UnknownType { type_name, .. })) if type_name == "Missing"
        ));
        assert!(matches!(
            Schema::parse("struct A { void v; };"),
            Err(Error::Schema(SchemaError::VoidValue { .. }))
        ));
        // behind a pointer an undeclared type is fine
        assert!(Schema::parse("struct A { struct Missing *m; };").is_ok());
    }

    #[test]
    fn recursive_embedding() {
        let err = Schema::parse("struct A { B b; }; struct B { int x; A a; };").unwrap_err();
        match err {
            Error::Schema(SchemaError::Recursive { path }) => {
                assert_eq!(path, vec!["A", "B", "A"])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn merge_rejects_overlap() {
        let mut a = Schema::parse("struct A { int x; };").unwrap();
        let b = Schema::parse("struct A { int y; };").unwrap();
        assert_eq!(a.merge(b), Err(SchemaError::DuplicateStruct("A".into())));
        let c = Schema::parse("struct C { A a; };");
        assert!(c.is_err());
        let c = Schema::from_source("struct C { A a; };").unwrap();
        a.merge(c).unwrap();
        a.check().unwrap();
        assert_eq!(a.struct_names().collect::<Vec<_>>(), vec!["A", "C"]);
    }

    #[test]
    fn source_round_trip() {
        let schema = Schema::parse(SOURCE).unwrap();
        assert_eq!(Schema::parse(&schema.to_source()).unwrap(), schema);
    }

    #[test]
    fn dna_round_trip() {
        let schema = Schema::parse(SOURCE).unwrap();
        for target in [Target::LITTLE_32, Target::LITTLE_64].iter() {
            let layouts = Layouts::compute(&schema, *target).unwrap();
            let dna = schema.to_dna(&layouts).unwrap();
            let back = Schema::from_dna(&dna, target.pointer_size).unwrap();
            assert_eq!(
                back.struct_names().collect::<Vec<_>>(),
                schema.struct_names().collect::<Vec<_>>()
            );
            // SDNA has no runtime marker, only the `_Runtime` naming survives
            let modifier = back.get("ModifierData").unwrap();
            assert_eq!(modifier.field("runtime").unwrap().role, FieldRole::Persisted);
            assert_eq!(
                back.get("Thing").unwrap().field("runtime").unwrap().role,
                FieldRole::Runtime
            );
        }
    }

    #[test]
    fn dna_size_mismatch() {
        let schema = Schema::parse(SOURCE).unwrap();
        let layouts = Layouts::compute(&schema, Target::LITTLE_64).unwrap();
        let dna = schema.to_dna(&layouts).unwrap();
        assert!(matches!(
            Schema::from_dna(&dna, PointerSize::Bits32),
            Err(SchemaError::SizeMismatch { .. })
        ));
    }
}
