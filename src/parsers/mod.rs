pub mod decl;
pub mod field;
pub mod primitive;
pub mod sdna;

use nom::{
    error::{ErrorKind, ParseError},
    number::Endianness as NomEndianness,
    IResult,
};
use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

type Result<'a, T> = IResult<&'a [u8], T, DnaParseError>;

/// Size of a pointer on the machine a layout is computed for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PointerSize {
    Bits32,
    Bits64,
}

impl PointerSize {
    pub const ALL: [PointerSize; 2] = [PointerSize::Bits32, PointerSize::Bits64];

    /// Returns the pointer size in bytes.
    pub fn bytes_num(self) -> usize {
        match self {
            PointerSize::Bits32 => 4,
            PointerSize::Bits64 => 8,
        }
    }
}

impl fmt::Display for PointerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes_num() * 8)
    }
}

impl FromStr for PointerSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "32" | "4" => Ok(PointerSize::Bits32),
            "64" | "8" => Ok(PointerSize::Bits64),
            other => Err(format!("unsupported pointer size `{}`, use 32 or 64", other)),
        }
    }
}

/// Byte order of the machine a record is read on or written for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Endianness {
    Little,
    Big,
}

impl From<NomEndianness> for Endianness {
    fn from(e: NomEndianness) -> Endianness {
        match e {
            NomEndianness::Little => Endianness::Little,
            NomEndianness::Big => Endianness::Big,
        }
    }
}

/// The machine parameters a layout depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub pointer_size: PointerSize,
    pub endianness: Endianness,
}

impl Target {
    pub const LITTLE_32: Target = Target {
        pointer_size: PointerSize::Bits32,
        endianness: Endianness::Little,
    };
    pub const LITTLE_64: Target = Target {
        pointer_size: PointerSize::Bits64,
        endianness: Endianness::Little,
    };

    pub fn new(pointer_size: PointerSize, endianness: Endianness) -> Self {
        Self {
            pointer_size,
            endianness,
        }
    }

    /// The target this crate was compiled for.
    pub fn native() -> Self {
        let pointer_size = if cfg!(target_pointer_width = "64") {
            PointerSize::Bits64
        } else {
            PointerSize::Bits32
        };
        let endianness = if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        };
        Self::new(pointer_size, endianness)
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::LITTLE_64
    }
}

/// Errors raised while reading declaration text or an SDNA block.
/// Most errors from the binary side are simply `NomError`, declaration text
/// failures are reported with the line they happened on.
#[derive(Debug, Error, PartialEq)]
pub enum DnaParseError {
    #[error("malformed SDNA block ({kind:?})")]
    NomError {
        kind: ErrorKind,
        other: Option<Box<DnaParseError>>,
    },
    /// Returned when the SDNA block ends before all its tables were read.
    #[error("SDNA block is truncated")]
    NotEnoughData,
    /// Declaration text could not be parsed.
    #[error("syntax error on line {line} ({kind:?})")]
    Syntax { line: usize, kind: ErrorKind },
    /// `unsigned` was combined with something other than char, short, int or long.
    #[error("unsupported type `unsigned {0}` on line {1}")]
    UnsupportedUnsigned(String, usize),
    /// A table is too long to be stored with the SDNA integer widths.
    #[error("{what} count {value} does not fit in an SDNA table")]
    ValueTooLarge { what: &'static str, value: usize },
}

impl DnaParseError {
    /// True if the input ran out somewhere down the error chain.
    pub(crate) fn is_eof(&self) -> bool {
        match self {
            DnaParseError::NotEnoughData => true,
            DnaParseError::NomError { kind, other } => {
                *kind == ErrorKind::Eof || other.as_ref().map_or(false, |o| o.is_eof())
            }
            _ => false,
        }
    }
}

impl ParseError<&[u8]> for DnaParseError {
    fn from_error_kind(_input: &[u8], kind: ErrorKind) -> Self {
        DnaParseError::NomError { kind, other: None }
    }

    fn append(_input: &[u8], kind: ErrorKind, other: Self) -> Self {
        DnaParseError::NomError {
            kind,
            other: Some(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_size_from_str() {
        assert_eq!("32".parse::<PointerSize>(), Ok(PointerSize::Bits32));
        assert_eq!("64".parse::<PointerSize>(), Ok(PointerSize::Bits64));
        assert!("16".parse::<PointerSize>().is_err());
        assert_eq!(PointerSize::Bits32.to_string(), "32-bit");
    }

    #[test]
    fn native_target_matches_compiler() {
        let target = Target::native();
        assert_eq!(
            target.pointer_size.bytes_num(),
            std::mem::size_of::<usize>()
        );
    }
}
