use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while},
    character::complete::char,
    combinator::cut,
    error::{ErrorKind, ParseError},
    multi::many0,
    sequence::delimited,
    Err, IResult,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FieldParseError {
    #[error("malformed field name ({kind:?})")]
    NomError {
        kind: ErrorKind,
        other: Option<Box<FieldParseError>>,
    },
    /// A dimension was zero or not a decimal number.
    #[error("invalid array size")]
    InvalidArraySize,
    #[error("field name is empty")]
    EmptyName,
    #[error("unexpected `{0}` after field name")]
    TrailingInput(String),
}

impl ParseError<&str> for FieldParseError {
    fn from_error_kind(_input: &str, kind: ErrorKind) -> Self {
        FieldParseError::NomError { kind, other: None }
    }

    fn append(_input: &str, kind: ErrorKind, other: Self) -> Self {
        FieldParseError::NomError {
            kind,
            other: Some(Box::new(other)),
        }
    }
}

type Result<'a, T> = IResult<&'a str, T, FieldParseError>;

/// The shape of a field, read from its declared name (`*next`, `mat[4][4]`,
/// `(*free)()`). The element type is stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldInfo {
    Value,
    ValueArray {
        len: usize,
        dimensions: Vec<usize>,
    },
    Pointer {
        indirection_count: usize,
    },
    PointerArray {
        indirection_count: usize,
        len: usize,
        dimensions: Vec<usize>,
    },
    FnPointer,
}

impl FieldInfo {
    pub fn is_pointer(&self) -> bool {
        match self {
            FieldInfo::Pointer { .. } | FieldInfo::PointerArray { .. } | FieldInfo::FnPointer => {
                true
            }
            FieldInfo::Value | FieldInfo::ValueArray { .. } => false,
        }
    }

    pub fn is_array(&self) -> bool {
        match self {
            FieldInfo::ValueArray { .. } | FieldInfo::PointerArray { .. } => true,
            _ => false,
        }
    }

    /// Number of elements stored, 1 for anything that isn't an array.
    pub fn element_count(&self) -> usize {
        match self {
            FieldInfo::ValueArray { len, .. } | FieldInfo::PointerArray { len, .. } => *len,
            _ => 1,
        }
    }
}

/// The bare identifier of a field. Running out of identifier characters
/// before any were read means the name itself is missing.
fn identifier(input: &str) -> Result<&str> {
    let (rest, ident) = take_while(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)?;
    if ident.is_empty() {
        return Err(Err::Failure(FieldParseError::EmptyName));
    }
    Ok((rest, ident))
}

/// One `[N]` suffix. Once the bracket is open, only a positive decimal
/// is accepted.
fn dimension(input: &str) -> Result<usize> {
    let (input, _) = char('[')(input)?;
    let (input, digits) = take_till(|c| c == ']')(input)?;
    let (input, _) = cut(char(']'))(input)?;
    match digits.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok((input, n)),
        _ => Err(Err::Failure(FieldParseError::InvalidArraySize)),
    }
}

fn shape(indirection_count: usize, dimensions: Vec<usize>) -> FieldInfo {
    let len = dimensions.iter().product();
    match (indirection_count, dimensions.is_empty()) {
        (0, true) => FieldInfo::Value,
        (0, false) => FieldInfo::ValueArray { len, dimensions },
        (indirection_count, true) => FieldInfo::Pointer { indirection_count },
        (indirection_count, false) => FieldInfo::PointerArray {
            indirection_count,
            len,
            dimensions,
        },
    }
}

/// `(*name)(...)`. The argument list is skipped, every function pointer
/// has the same storage.
pub fn fn_pointer(input: &str) -> Result<(&str, FieldInfo)> {
    let (input, name) = delimited(tag("(*"), identifier, char(')'))(input)?;
    let (input, _) = cut(delimited(char('('), take_until(")"), char(')')))(input)?;
    Ok((input, (name, FieldInfo::FnPointer)))
}

/// Stars, an identifier and any number of dimensions: `**mat`, `co[3]`,
/// `*mtex[18]`.
fn data_field(input: &str) -> Result<(&str, FieldInfo)> {
    let (input, stars) = many0(char('*'))(input)?;
    let (input, name) = identifier(input)?;
    let (input, dimensions) = many0(dimension)(input)?;
    Ok((input, (name, shape(stars.len(), dimensions))))
}

pub fn parse_field(input: &str) -> Result<(&str, FieldInfo)> {
    alt((fn_pointer, data_field))(input)
}

/// Parses a whole field name, returning the bare identifier and the field shape.
pub fn parse_field_name(full: &str) -> std::result::Result<(&str, FieldInfo), FieldParseError> {
    match parse_field(full) {
        Ok(("", (name, info))) => Ok((name, info)),
        Ok((rest, _)) => Err(FieldParseError::TrailingInput(rest.to_string())),
        Err(Err::Error(e)) | Err(Err::Failure(e)) => Err(e),
        Err(Err::Incomplete(_)) => Err(FieldParseError::NomError {
            kind: ErrorKind::Eof,
            other: None,
        }),
    }
}
