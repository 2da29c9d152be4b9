//! Parser for the C-like declaration text the schema is written in.
//!
//! ```text
//! struct Link {
//!   struct Link *next, *prev;
//! };
//! ```
//!
//! Only struct blocks are accepted. A statement may start with
//! `DNA_RUNTIME` to mark every field it declares as session-only state.

use super::DnaParseError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1},
    combinator::{cut, opt, recognize, verify},
    error::{ErrorKind, ParseError},
    multi::{many0, separated_nonempty_list},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Err, IResult,
};

/// The runtime marker keyword.
pub const RUNTIME_MARKER: &str = "DNA_RUNTIME";

#[derive(Debug, Clone, PartialEq)]
pub struct DeclError {
    /// Length of the input left when the error happened.
    remaining: usize,
    kind: ErrorKind,
    unsigned: Option<String>,
}

impl ParseError<&str> for DeclError {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        DeclError {
            remaining: input.len(),
            kind,
            unsigned: None,
        }
    }

    fn append(_input: &str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type Result<'a, T> = IResult<&'a str, T, DeclError>;

/// A struct block as written.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

/// One declarator of a field statement. `name` is the canonical DNA field
/// name: pointer stars, identifier and array dimensions with no spaces, and
/// `(*ident)()` for function pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub type_name: String,
    pub name: String,
    pub runtime: bool,
}

impl StructDecl {
    /// Renders the block back to declaration text.
    pub fn to_source(&self) -> String {
        let mut out = format!("struct {} {{\n", self.name);
        for field in &self.fields {
            out.push_str("  ");
            if field.runtime {
                out.push_str(RUNTIME_MARKER);
                out.push(' ');
            }
            out.push_str(&format!("{} {};\n", field.type_name, field.name));
        }
        out.push_str("};\n");
        out
    }
}

fn line_comment(input: &str) -> Result<&str> {
    recognize(pair(tag("//"), take_while(|c: char| c != '\n')))(input)
}

fn block_comment(input: &str) -> Result<&str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// Skips whitespace and comments.
fn sp(input: &str) -> Result<()> {
    let (input, _) = many0(alt((multispace1, line_comment, block_comment)))(input)?;
    Ok((input, ()))
}

fn identifier(input: &str) -> Result<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl Fn(&'a str) -> Result<'a, &'a str> {
    verify(identifier, move |ident: &str| ident == word)
}

fn type_name(input: &str) -> Result<String> {
    let (input, _) = many0(terminated(alt((keyword("struct"), keyword("const"))), sp))(input)?;
    let (input, unsigned) = opt(terminated(keyword("unsigned"), sp))(input)?;
    let (rest, base) = identifier(input)?;

    let name = match (unsigned, base) {
        (None, base) => base.to_string(),
        (Some(_), "char") => "uchar".to_string(),
        (Some(_), "short") => "ushort".to_string(),
        (Some(_), "int") => "uint".to_string(),
        (Some(_), "long") => "ulong".to_string(),
        (Some(_), other) => {
            let mut error = DeclError::from_error_kind(input, ErrorKind::Verify);
            error.unsigned = Some(other.to_string());
            return Err(Err::Failure(error));
        }
    };
    Ok((rest, name))
}

fn fn_pointer_declarator(input: &str) -> Result<String> {
    let (input, _) = char('(')(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char('*')(input)?;
    let (input, _) = sp(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char(')')(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = delimited(char('('), take_until(")"), char(')'))(input)?;
    Ok((input, format!("(*{})()", name)))
}

fn dimension(input: &str) -> Result<&str> {
    preceded(sp, delimited(char('['), delimited(sp, digit1, sp), char(']')))(input)
}

fn plain_declarator(input: &str) -> Result<String> {
    let (input, stars) = many0(terminated(char('*'), sp))(input)?;
    let (input, name) = identifier(input)?;
    let (input, dimensions) = many0(dimension)(input)?;

    let mut canonical = "*".repeat(stars.len());
    canonical.push_str(name);
    for d in dimensions {
        canonical.push('[');
        canonical.push_str(d);
        canonical.push(']');
    }
    Ok((input, canonical))
}

fn declarator(input: &str) -> Result<String> {
    alt((fn_pointer_declarator, plain_declarator))(input)
}

fn field_statement(input: &str) -> Result<Vec<FieldDecl>> {
    let (input, runtime) = opt(terminated(keyword(RUNTIME_MARKER), sp))(input)?;
    let (input, type_name) = type_name(input)?;
    let (input, _) = sp(input)?;
    let (input, names) =
        separated_nonempty_list(delimited(sp, char(','), sp), declarator)(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char(';')(input)?;

    let runtime = runtime.is_some();
    Ok((
        input,
        names
            .into_iter()
            .map(|name| FieldDecl {
                type_name: type_name.clone(),
                name,
                runtime,
            })
            .collect(),
    ))
}

fn struct_body(input: &str) -> Result<Vec<FieldDecl>> {
    let (input, statements) = many0(preceded(sp, field_statement))(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char('}')(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char(';')(input)?;
    Ok((input, statements.into_iter().flatten().collect()))
}

fn struct_decl(input: &str) -> Result<StructDecl> {
    let (input, _) = keyword("struct")(input)?;
    let (input, _) = sp(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char('{')(input)?;
    let (input, fields) = cut(struct_body)(input)?;
    Ok((
        input,
        StructDecl {
            name: name.to_string(),
            fields,
        },
    ))
}

fn declarations(input: &str) -> Result<Vec<StructDecl>> {
    let (input, decls) = many0(preceded(sp, struct_decl))(input)?;
    let (input, _) = sp(input)?;
    if input.is_empty() {
        Ok((input, decls))
    } else {
        Err(Err::Error(DeclError::from_error_kind(input, ErrorKind::Eof)))
    }
}

fn line_of(text: &str, remaining: usize) -> usize {
    let offset = text.len().saturating_sub(remaining);
    text.as_bytes()[..offset]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
        + 1
}

/// Parses every struct block in `text`.
pub fn parse_declarations(text: &str) -> std::result::Result<Vec<StructDecl>, DnaParseError> {
    match declarations(text) {
        Ok((_, decls)) => Ok(decls),
        Err(Err::Error(e)) | Err(Err::Failure(e)) => {
            let line = line_of(text, e.remaining);
            Err(match e.unsigned {
                Some(base) => DnaParseError::UnsupportedUnsigned(base, line),
                None => DnaParseError::Syntax { line, kind: e.kind },
            })
        }
        Err(Err::Incomplete(_)) => Err(DnaParseError::NotEnoughData),
    }
}
