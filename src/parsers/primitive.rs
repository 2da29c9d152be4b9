use super::Endianness;
use nom::number::complete::{
    be_f32, be_f64, be_i16, be_i32, be_i64, be_i8, be_u16, be_u32, be_u64, be_u8, le_f32, le_f64,
    le_i16, le_i32, le_i64, le_i8, le_u16, le_u32, le_u64, le_u8,
};
use serde::Serialize;
use std::fmt;

/// The primitive type names a DNA declaration may use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Int64,
    UInt64,
    Void,
    Int8,
    UInt8,
}

impl Primitive {
    /// Every primitive in the order they are written to an SDNA type table.
    pub const ALL: [Primitive; 15] = [
        Primitive::Char,
        Primitive::UChar,
        Primitive::Short,
        Primitive::UShort,
        Primitive::Int,
        Primitive::UInt,
        Primitive::Long,
        Primitive::ULong,
        Primitive::Float,
        Primitive::Double,
        Primitive::Int64,
        Primitive::UInt64,
        Primitive::Void,
        Primitive::Int8,
        Primitive::UInt8,
    ];

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Char => "char",
            Primitive::UChar => "uchar",
            Primitive::Short => "short",
            Primitive::UShort => "ushort",
            Primitive::Int => "int",
            Primitive::UInt => "uint",
            Primitive::Long => "long",
            Primitive::ULong => "ulong",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Int64 => "int64_t",
            Primitive::UInt64 => "uint64_t",
            Primitive::Void => "void",
            Primitive::Int8 => "int8_t",
            Primitive::UInt8 => "uint8_t",
        }
    }

    /// Size in bytes. `long` follows the pointer width (ILP32 / LP64) and
    /// `void` has no size of its own.
    pub fn size(self, pointer_bytes: usize) -> usize {
        match self {
            Primitive::Char | Primitive::UChar | Primitive::Int8 | Primitive::UInt8 => 1,
            Primitive::Short | Primitive::UShort => 2,
            Primitive::Int | Primitive::UInt | Primitive::Float => 4,
            Primitive::Double | Primitive::Int64 | Primitive::UInt64 => 8,
            Primitive::Long | Primitive::ULong => pointer_bytes,
            Primitive::Void => 0,
        }
    }

    /// `long` changes size between platforms, it can't be part of a stable layout.
    pub fn is_platform_dependent(self) -> bool {
        self == Primitive::Long || self == Primitive::ULong
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type that can be read from and written to a primitive DNA field.
pub trait BlendPrimitive: Sized + Copy {
    const SIZE: usize;

    /// Reads a value from the start of `data`. Returns `None` if `data` is too short.
    fn parse(data: &[u8], endianness: Endianness) -> Option<Self>;
    /// Writes the value to the start of `out`. Returns `None` if `out` is too short.
    fn write(self, out: &mut [u8], endianness: Endianness) -> Option<()>;
    /// The DNA primitives whose storage this type can read.
    fn primitives() -> &'static [Primitive];
    fn rust_name() -> &'static str;

    /// The DNA name this type is usually declared with.
    fn blender_name() -> &'static str {
        Self::primitives()[0].name()
    }
}

macro_rules! blend_primitive {
    ($ty:ty, $le:ident, $be:ident, [$($primitive:ident),+]) => {
        impl BlendPrimitive for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn parse(data: &[u8], endianness: Endianness) -> Option<Self> {
                let res = match endianness {
                    Endianness::Little => $le::<()>(data),
                    Endianness::Big => $be::<()>(data),
                };
                res.ok().map(|(_, v)| v)
            }

            fn write(self, out: &mut [u8], endianness: Endianness) -> Option<()> {
                let bytes = match endianness {
                    Endianness::Little => self.to_le_bytes(),
                    Endianness::Big => self.to_be_bytes(),
                };
                out.get_mut(..bytes.len())?.copy_from_slice(&bytes);
                Some(())
            }

            fn primitives() -> &'static [Primitive] {
                &[$(Primitive::$primitive),+]
            }

            fn rust_name() -> &'static str {
                stringify!($ty)
            }
        }
    };
}

blend_primitive!(u8, le_u8, be_u8, [UChar, Char, UInt8]);
blend_primitive!(i8, le_i8, be_i8, [Char, Int8, UChar]);
blend_primitive!(u16, le_u16, be_u16, [UShort]);
blend_primitive!(i16, le_i16, be_i16, [Short]);
blend_primitive!(u32, le_u32, be_u32, [UInt]);
blend_primitive!(i32, le_i32, be_i32, [Int]);
blend_primitive!(f32, le_f32, be_f32, [Float]);
blend_primitive!(f64, le_f64, be_f64, [Double]);
blend_primitive!(u64, le_u64, be_u64, [UInt64]);
blend_primitive!(i64, le_i64, be_i64, [Int64]);
