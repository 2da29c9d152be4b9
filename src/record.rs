//! Typed views over the raw bytes of one struct instance.
//!
//! A [`Record`] reads fields by name from a byte slice laid out by
//! [`Layouts`]; [`RecordMut`] writes them. [`RecordBuf`] owns its bytes and is
//! the way to build a record from scratch.
//!
//! Pointers are plain addresses here. A null pointer reads as `None`, nothing
//! is ever dereferenced.

use crate::{
    layout::{FieldKind, FieldLayout, Layouts, StructLayout},
    parsers::{primitive::BlendPrimitive, Endianness, PointerSize},
    schema::FieldRole,
};
use std::{convert::TryFrom, fmt, num::NonZeroU64};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("unknown struct `{0}`")]
    UnknownStruct(String),
    #[error("`{type_name}` is {expected} bytes, got {actual}")]
    WrongSize {
        type_name: String,
        expected: usize,
        actual: usize,
    },
    #[error("`{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },
    #[error("field `{field}` can't be accessed as {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
    #[error("field `{field}` holds {capacity} elements, got {actual}")]
    LengthMismatch {
        field: String,
        capacity: usize,
        actual: usize,
    },
    #[error("address {0:#x} does not fit in a 32-bit pointer")]
    AddressOutOfRange(u64),
}

fn lookup<'l>(layouts: &'l Layouts, type_name: &str) -> Result<&'l StructLayout, RecordError> {
    layouts
        .get(type_name)
        .ok_or_else(|| RecordError::UnknownStruct(type_name.to_string()))
}

fn expect_field<'l>(layout: &'l StructLayout, name: &str) -> Result<&'l FieldLayout, RecordError> {
    layout.field(name).ok_or_else(|| RecordError::UnknownField {
        type_name: layout.name.clone(),
        field: name.to_string(),
    })
}

fn mismatch(field: &FieldLayout, expected: &'static str) -> RecordError {
    RecordError::TypeMismatch {
        field: field.ident.clone(),
        expected,
    }
}

fn check_primitive<U: BlendPrimitive>(field: &FieldLayout) -> Result<(), RecordError> {
    match field.kind {
        FieldKind::Primitive(p) if U::primitives().contains(&p) => Ok(()),
        _ => Err(mismatch(field, U::rust_name())),
    }
}

fn parse_pointer(data: &[u8], pointer_size: PointerSize, endianness: Endianness) -> Option<NonZeroU64> {
    let address = match pointer_size {
        PointerSize::Bits32 => u32::parse(data, endianness).map(u64::from),
        PointerSize::Bits64 => u64::parse(data, endianness),
    };
    address.and_then(NonZeroU64::new)
}

/// A read-only view of one struct instance.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    layouts: &'a Layouts,
    layout: &'a StructLayout,
    data: &'a [u8],
}

impl<'a> Record<'a> {
    /// Views `data` as a `type_name`. `data` must be exactly one struct long.
    pub fn new(layouts: &'a Layouts, type_name: &str, data: &'a [u8]) -> Result<Self, RecordError> {
        let layout = lookup(layouts, type_name)?;
        if data.len() != layout.size {
            return Err(RecordError::WrongSize {
                type_name: type_name.to_string(),
                expected: layout.size,
                actual: data.len(),
            });
        }
        Ok(Record {
            layouts,
            layout,
            data,
        })
    }

    /// Views `data` as a packed array of `type_name`.
    pub fn array(
        layouts: &'a Layouts,
        type_name: &str,
        data: &'a [u8],
    ) -> Result<Vec<Record<'a>>, RecordError> {
        let layout = lookup(layouts, type_name)?;
        if layout.size == 0 || data.len() % layout.size != 0 {
            return Err(RecordError::WrongSize {
                type_name: type_name.to_string(),
                expected: layout.size,
                actual: data.len(),
            });
        }
        Ok(data
            .chunks(layout.size)
            .map(|data| Record {
                layouts,
                layout,
                data,
            })
            .collect())
    }

    pub fn type_name(&self) -> &'a str {
        &self.layout.name
    }

    pub fn layout(&self) -> &'a StructLayout {
        self.layout
    }

    pub fn layouts(&self) -> &'a Layouts {
        self.layouts
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a FieldLayout> {
        self.layout.fields.iter()
    }

    pub fn has_field<T: AsRef<str>>(&self, name: T) -> bool {
        self.layout.field(name.as_ref()).is_some()
    }

    fn endianness(&self) -> Endianness {
        self.layouts.target().endianness
    }

    fn field_bytes(&self, field: &FieldLayout) -> &'a [u8] {
        &self.data[field.range()]
    }

    fn get_value<T: AsRef<str>, U: BlendPrimitive>(&self, name: T) -> Result<U, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        check_primitive::<U>(field)?;
        if field.is_array {
            return Err(mismatch(field, "a single value"));
        }
        U::parse(self.field_bytes(field), self.endianness())
            .ok_or_else(|| mismatch(field, U::rust_name()))
    }

    pub fn get_u8<T: AsRef<str>>(&self, name: T) -> Result<u8, RecordError> {
        self.get_value(name)
    }
    pub fn get_i8<T: AsRef<str>>(&self, name: T) -> Result<i8, RecordError> {
        self.get_value(name)
    }
    pub fn get_u16<T: AsRef<str>>(&self, name: T) -> Result<u16, RecordError> {
        self.get_value(name)
    }
    pub fn get_i16<T: AsRef<str>>(&self, name: T) -> Result<i16, RecordError> {
        self.get_value(name)
    }
    pub fn get_u32<T: AsRef<str>>(&self, name: T) -> Result<u32, RecordError> {
        self.get_value(name)
    }
    pub fn get_i32<T: AsRef<str>>(&self, name: T) -> Result<i32, RecordError> {
        self.get_value(name)
    }
    pub fn get_f32<T: AsRef<str>>(&self, name: T) -> Result<f32, RecordError> {
        self.get_value(name)
    }
    pub fn get_f64<T: AsRef<str>>(&self, name: T) -> Result<f64, RecordError> {
        self.get_value(name)
    }
    pub fn get_u64<T: AsRef<str>>(&self, name: T) -> Result<u64, RecordError> {
        self.get_value(name)
    }
    pub fn get_i64<T: AsRef<str>>(&self, name: T) -> Result<i64, RecordError> {
        self.get_value(name)
    }

    /// Reads every element of a primitive field. Multi-dimensional arrays are
    /// flattened in row-major order.
    fn get_value_vec<T: AsRef<str>, U: BlendPrimitive>(
        &self,
        name: T,
    ) -> Result<Vec<U>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        check_primitive::<U>(field)?;
        let endianness = self.endianness();
        self.field_bytes(field)
            .chunks(field.element_size)
            .map(|chunk| U::parse(chunk, endianness).ok_or_else(|| mismatch(field, U::rust_name())))
            .collect()
    }

    pub fn get_u8_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<u8>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_i8_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<i8>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_i16_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<i16>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_i32_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<i32>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_u32_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<u32>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_f32_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<f32>, RecordError> {
        self.get_value_vec(name)
    }
    pub fn get_f64_vec<T: AsRef<str>>(&self, name: T) -> Result<Vec<f64>, RecordError> {
        self.get_value_vec(name)
    }

    /// Reads a fixed size float array such as `co[3]`.
    pub fn get_f32_array<T: AsRef<str>, const N: usize>(&self, name: T) -> Result<[f32; N], RecordError> {
        let name = name.as_ref();
        let values = self.get_f32_vec(name)?;
        let mut out = [0.0; N];
        if values.len() != N {
            return Err(RecordError::LengthMismatch {
                field: name.to_string(),
                capacity: values.len(),
                actual: N,
            });
        }
        out.copy_from_slice(&values);
        Ok(out)
    }

    /// Reads a `char` array up to its first NUL byte.
    pub fn get_string<T: AsRef<str>>(&self, name: T) -> Result<String, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        match field.kind {
            FieldKind::Primitive(p) if p.size(0) == 1 && field.is_array => {
                let bytes = self.field_bytes(field);
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            _ => Err(mismatch(field, "a string")),
        }
    }

    /// Reads a pointer field. Null reads as `None`.
    pub fn get_pointer<T: AsRef<str>>(&self, name: T) -> Result<Option<NonZeroU64>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if !field.is_pointer() || field.is_array {
            return Err(mismatch(field, "a pointer"));
        }
        let target = self.layouts.target();
        Ok(parse_pointer(
            self.field_bytes(field),
            target.pointer_size,
            target.endianness,
        ))
    }

    pub fn get_pointer_vec<T: AsRef<str>>(
        &self,
        name: T,
    ) -> Result<Vec<Option<NonZeroU64>>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if !field.is_pointer() {
            return Err(mismatch(field, "a pointer"));
        }
        let target = self.layouts.target();
        Ok(self
            .field_bytes(field)
            .chunks(field.element_size)
            .map(|chunk| parse_pointer(chunk, target.pointer_size, target.endianness))
            .collect())
    }

    /// Views an embedded struct field.
    pub fn get<T: AsRef<str>>(&self, name: T) -> Result<Record<'a>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if field.kind != FieldKind::Struct || field.is_array {
            return Err(mismatch(field, "a struct"));
        }
        Record::new(self.layouts, &field.type_name, self.field_bytes(field))
    }

    /// Views each element of an embedded struct array.
    pub fn get_iter<T: AsRef<str>>(&self, name: T) -> Result<Vec<Record<'a>>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if field.kind != FieldKind::Struct {
            return Err(mismatch(field, "a struct"));
        }
        Record::array(self.layouts, &field.type_name, self.field_bytes(field))
    }

    /// The struct this record starts with, if its first field embeds one.
    pub fn base(&self) -> Option<Record<'a>> {
        let first = self.layout.fields.first()?;
        if first.kind == FieldKind::Struct && !first.is_array {
            self.get(&first.ident).ok()
        } else {
            None
        }
    }

    /// Walks the base chain until a record of type `base` is found.
    pub fn upcast(&self, base: &str) -> Option<Record<'a>> {
        let mut current = *self;
        loop {
            if current.type_name() == base {
                return Some(current);
            }
            current = current.base()?;
        }
    }

    /// Compares the persisted content of two records, skipping runtime and
    /// padding fields at every nesting level.
    pub fn persisted_eq(&self, other: &Record<'_>) -> bool {
        if self.layout.name != other.layout.name || self.data.len() != other.data.len() {
            return false;
        }
        self.layout.fields.iter().all(|field| match field.role {
            FieldRole::Runtime | FieldRole::Padding => true,
            FieldRole::Persisted if field.kind == FieldKind::Struct => {
                match (self.get_iter(&field.ident), other.get_iter(&field.ident)) {
                    (Ok(a), Ok(b)) => a.iter().zip(b.iter()).all(|(a, b)| a.persisted_eq(b)),
                    _ => self.data[field.range()] == other.data[field.range()],
                }
            }
            FieldRole::Persisted => self.data[field.range()] == other.data[field.range()],
        })
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type_name", &self.layout.name)
            .field("len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.layout.name)?;
        for field in self.fields().filter(|field| field.role != FieldRole::Padding) {
            let value = match field.kind {
                FieldKind::Primitive(p) if p.size(0) == 1 && field.is_array => self
                    .get_string(&field.ident)
                    .map(|s| format!("{:?}", s))
                    .unwrap_or_default(),
                FieldKind::Struct => format!("{} {{ .. }}", field.type_name),
                FieldKind::Pointer | FieldKind::FnPointer if !field.is_array => {
                    match self.get_pointer(&field.ident) {
                        Ok(Some(address)) => format!("{:#x}", address.get()),
                        _ => "null".to_string(),
                    }
                }
                _ => format!("{:02x?}", self.field_bytes(field)),
            };
            writeln!(f, "    {}: {} = {}", field.name, field.type_name, value)?;
        }
        write!(f, "}}")
    }
}

/// A mutable view of one struct instance.
pub struct RecordMut<'a> {
    layouts: &'a Layouts,
    layout: &'a StructLayout,
    data: &'a mut [u8],
}

impl<'a> RecordMut<'a> {
    pub fn new(
        layouts: &'a Layouts,
        type_name: &str,
        data: &'a mut [u8],
    ) -> Result<Self, RecordError> {
        let layout = lookup(layouts, type_name)?;
        if data.len() != layout.size {
            return Err(RecordError::WrongSize {
                type_name: type_name.to_string(),
                expected: layout.size,
                actual: data.len(),
            });
        }
        Ok(RecordMut {
            layouts,
            layout,
            data,
        })
    }

    pub fn as_record(&self) -> Record<'_> {
        Record {
            layouts: self.layouts,
            layout: self.layout,
            data: &*self.data,
        }
    }

    fn endianness(&self) -> Endianness {
        self.layouts.target().endianness
    }

    fn set_value<T: AsRef<str>, U: BlendPrimitive>(&mut self, name: T, value: U) -> Result<(), RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        check_primitive::<U>(field)?;
        if field.is_array {
            return Err(mismatch(field, "a single value"));
        }
        let endianness = self.endianness();
        value
            .write(&mut self.data[field.range()], endianness)
            .ok_or_else(|| mismatch(field, U::rust_name()))
    }

    pub fn set_u8<T: AsRef<str>>(&mut self, name: T, value: u8) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_i8<T: AsRef<str>>(&mut self, name: T, value: i8) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_u16<T: AsRef<str>>(&mut self, name: T, value: u16) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_i16<T: AsRef<str>>(&mut self, name: T, value: i16) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_u32<T: AsRef<str>>(&mut self, name: T, value: u32) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_i32<T: AsRef<str>>(&mut self, name: T, value: i32) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_f32<T: AsRef<str>>(&mut self, name: T, value: f32) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_f64<T: AsRef<str>>(&mut self, name: T, value: f64) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_u64<T: AsRef<str>>(&mut self, name: T, value: u64) -> Result<(), RecordError> {
        self.set_value(name, value)
    }
    pub fn set_i64<T: AsRef<str>>(&mut self, name: T, value: i64) -> Result<(), RecordError> {
        self.set_value(name, value)
    }

    /// Writes every element of a primitive array. `values` must fill it exactly.
    pub fn set_slice<T: AsRef<str>, U: BlendPrimitive>(
        &mut self,
        name: T,
        values: &[U],
    ) -> Result<(), RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        check_primitive::<U>(field)?;
        if values.len() != field.count {
            return Err(RecordError::LengthMismatch {
                field: field.ident.clone(),
                capacity: field.count,
                actual: values.len(),
            });
        }
        let endianness = self.endianness();
        let bytes = &mut self.data[field.range()];
        for (chunk, &value) in bytes.chunks_mut(field.element_size).zip(values) {
            value
                .write(chunk, endianness)
                .ok_or_else(|| mismatch(field, U::rust_name()))?;
        }
        Ok(())
    }

    /// Writes a NUL terminated string, truncated on a character boundary so
    /// the terminator always fits. The rest of the array is zeroed.
    pub fn set_string<T: AsRef<str>>(&mut self, name: T, value: &str) -> Result<(), RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        match field.kind {
            FieldKind::Primitive(p) if p.size(0) == 1 && field.is_array => {}
            _ => return Err(mismatch(field, "a string")),
        }
        let value = truncate_to_boundary(value, field.size - 1);
        let bytes = &mut self.data[field.range()];
        bytes.iter_mut().for_each(|b| *b = 0);
        bytes[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn set_pointer<T: AsRef<str>>(
        &mut self,
        name: T,
        address: Option<NonZeroU64>,
    ) -> Result<(), RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if !field.is_pointer() || field.is_array {
            return Err(mismatch(field, "a pointer"));
        }
        let address = address.map_or(0, NonZeroU64::get);
        let target = self.layouts.target();
        let bytes = &mut self.data[field.range()];
        let written = match target.pointer_size {
            PointerSize::Bits32 => {
                let address = u32::try_from(address)
                    .map_err(|_| RecordError::AddressOutOfRange(address))?;
                address.write(bytes, target.endianness)
            }
            PointerSize::Bits64 => address.write(bytes, target.endianness),
        };
        written.ok_or_else(|| mismatch(field, "a pointer"))
    }

    /// A mutable view of an embedded struct field.
    pub fn field_mut<T: AsRef<str>>(&mut self, name: T) -> Result<RecordMut<'_>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if field.kind != FieldKind::Struct || field.is_array {
            return Err(mismatch(field, "a struct"));
        }
        RecordMut::new(self.layouts, &field.type_name, &mut self.data[field.range()])
    }

    /// A mutable view of element `index` of an embedded struct array.
    pub fn element_mut<T: AsRef<str>>(
        &mut self,
        name: T,
        index: usize,
    ) -> Result<RecordMut<'_>, RecordError> {
        let field = expect_field(self.layout, name.as_ref())?;
        if field.kind != FieldKind::Struct {
            return Err(mismatch(field, "a struct"));
        }
        if index >= field.count {
            return Err(RecordError::LengthMismatch {
                field: field.ident.clone(),
                capacity: field.count,
                actual: index + 1,
            });
        }
        let start = field.offset + index * field.element_size;
        RecordMut::new(
            self.layouts,
            &field.type_name,
            &mut self.data[start..start + field.element_size],
        )
    }

    /// Zeroes every runtime field, including those of embedded structs.
    pub fn clear_runtime(&mut self) {
        let layouts = self.layouts;
        let layout = self.layout;
        for field in &layout.fields {
            if field.role == FieldRole::Runtime {
                self.data[field.range()].iter_mut().for_each(|b| *b = 0);
            } else if field.kind == FieldKind::Struct && field.element_size > 0 {
                let inner = match layouts.get(&field.type_name) {
                    Some(inner) => inner,
                    None => continue,
                };
                for chunk in self.data[field.range()].chunks_mut(field.element_size) {
                    RecordMut {
                        layouts,
                        layout: inner,
                        data: chunk,
                    }
                    .clear_runtime();
                }
            }
        }
    }
}

/// Cuts `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// An owned, zero-initialised struct instance.
#[derive(Clone)]
pub struct RecordBuf<'a> {
    layouts: &'a Layouts,
    layout: &'a StructLayout,
    data: Vec<u8>,
}

impl<'a> RecordBuf<'a> {
    pub fn zeroed(layouts: &'a Layouts, type_name: &str) -> Result<Self, RecordError> {
        let layout = lookup(layouts, type_name)?;
        Ok(RecordBuf {
            layouts,
            layout,
            data: vec![0; layout.size],
        })
    }

    pub fn from_vec(layouts: &'a Layouts, type_name: &str, data: Vec<u8>) -> Result<Self, RecordError> {
        Record::new(layouts, type_name, &data)?;
        let layout = lookup(layouts, type_name)?;
        Ok(RecordBuf {
            layouts,
            layout,
            data,
        })
    }

    pub fn as_record(&self) -> Record<'_> {
        Record {
            layouts: self.layouts,
            layout: self.layout,
            data: &self.data,
        }
    }

    pub fn as_mut(&mut self) -> RecordMut<'_> {
        RecordMut {
            layouts: self.layouts,
            layout: self.layout,
            data: &mut self.data,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for RecordBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_record(), f)
    }
}
