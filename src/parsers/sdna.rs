use crate::parsers::{DnaParseError, Endianness, Result};
use nom::{
    bytes::complete::{tag, take, take_while},
    combinator::map,
    multi::count,
    number::complete::{be_u16, be_u32, le_u16, le_u32},
    sequence::terminated,
    Err,
};
use std::convert::TryFrom;

/// The decoded tables of an SDNA block.
#[derive(Debug, Clone, PartialEq)]
pub struct Dna {
    pub names: Vec<String>,
    pub types: Vec<DnaType>,
    pub structs: Vec<DnaStruct>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnaType {
    pub name: String,
    pub bytes_len: usize, //size in bytes of the type
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnaField {
    pub type_index: usize, //index on Dna::types array
    pub name_index: usize, //index on Dna::names array
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnaStruct {
    pub type_index: usize, //index on Dna::types array
    pub fields: Vec<DnaField>,
}

fn padding_to_4(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[derive(Debug)]
pub struct DnaParseContext {
    endianness: Endianness,
}

impl DnaParseContext {
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    fn u32<'a>(&self, input: &'a [u8]) -> Result<'a, usize> {
        let (input, v) = match self.endianness {
            Endianness::Little => le_u32(input)?,
            Endianness::Big => be_u32(input)?,
        };
        // u32 always fits the platforms nom runs on
        Ok((input, v as usize))
    }

    fn u16<'a>(&self, input: &'a [u8]) -> Result<'a, usize> {
        let (input, v) = match self.endianness {
            Endianness::Little => le_u16(input)?,
            Endianness::Big => be_u16(input)?,
        };
        Ok((input, usize::from(v)))
    }

    /// Reads a table length. Every entry takes at least one byte, so a
    /// length past the end of the input cannot be satisfied.
    fn table_len<'a>(&self, input: &'a [u8]) -> Result<'a, usize> {
        let (input, len) = self.u32(input)?;
        if len > input.len() {
            return Err(Err::Failure(DnaParseError::NotEnoughData));
        }
        Ok((input, len))
    }

    /// Reads `len` NUL terminated strings followed by padding to a multiple of 4.
    fn strings<'a>(&self, input: &'a [u8], len: usize) -> Result<'a, Vec<String>> {
        let start_len = input.len();
        let (input, strings) = count(
            terminated(
                map(take_while(|b: u8| b != 0), |b: &[u8]| {
                    String::from_utf8_lossy(b).into_owned()
                }),
                tag("\0"),
            ),
            len,
        )(input)?;
        let (input, _) = take(padding_to_4(start_len - input.len()))(input)?;
        Ok((input, strings))
    }

    fn names<'a>(&self, input: &'a [u8]) -> Result<'a, Vec<String>> {
        let (input, _) = tag("NAME")(input)?;
        let (input, names_len) = self.table_len(input)?;
        self.strings(input, names_len)
    }

    fn types<'a>(&self, input: &'a [u8]) -> Result<'a, Vec<DnaType>> {
        let (input, _) = tag("TYPE")(input)?;
        let (input, types_len) = self.table_len(input)?;
        let (input, type_names) = self.strings(input, types_len)?;

        let (input, _) = tag("TLEN")(input)?;
        let (input, type_lengths) = count(|i| self.u16(i), types_len)(input)?;
        let (input, _) = take(padding_to_4(types_len * 2))(input)?;

        Ok((
            input,
            type_names
                .into_iter()
                .zip(type_lengths)
                .map(|(name, bytes_len)| DnaType { name, bytes_len })
                .collect(),
        ))
    }

    fn field<'a>(&self, input: &'a [u8]) -> Result<'a, DnaField> {
        let (input, type_index) = self.u16(input)?;
        let (input, name_index) = self.u16(input)?;
        Ok((
            input,
            DnaField {
                type_index,
                name_index,
            },
        ))
    }

    fn structs<'a>(&self, input: &'a [u8]) -> Result<'a, Vec<DnaStruct>> {
        let (input, _) = tag("STRC")(input)?;
        let (mut input, structs_len) = self.table_len(input)?;

        let mut structs = Vec::with_capacity(structs_len);
        for _ in 0..structs_len {
            let (rest, type_index) = self.u16(input)?;
            let (rest, fields_num) = self.u16(rest)?;
            let (rest, fields) = count(|i| self.field(i), fields_num)(rest)?;
            input = rest;
            structs.push(DnaStruct { type_index, fields });
        }

        Ok((input, structs))
    }

    pub fn dna<'a>(&self, input: &'a [u8]) -> Result<'a, Dna> {
        let (input, _) = tag("SDNA")(input)?;
        let (input, names) = self.names(input)?;
        let (input, types) = self.types(input)?;
        let (input, structs) = self.structs(input)?;

        Ok((
            input,
            Dna {
                names,
                types,
                structs,
            },
        ))
    }
}

struct Writer {
    out: Vec<u8>,
    endianness: Endianness,
}

impl Writer {
    fn u32(&mut self, what: &'static str, value: usize) -> std::result::Result<(), DnaParseError> {
        let v = u32::try_from(value).map_err(|_| DnaParseError::ValueTooLarge { what, value })?;
        match self.endianness {
            Endianness::Little => self.out.extend_from_slice(&v.to_le_bytes()),
            Endianness::Big => self.out.extend_from_slice(&v.to_be_bytes()),
        }
        Ok(())
    }

    fn u16(&mut self, what: &'static str, value: usize) -> std::result::Result<(), DnaParseError> {
        let v = u16::try_from(value).map_err(|_| DnaParseError::ValueTooLarge { what, value })?;
        match self.endianness {
            Endianness::Little => self.out.extend_from_slice(&v.to_le_bytes()),
            Endianness::Big => self.out.extend_from_slice(&v.to_be_bytes()),
        }
        Ok(())
    }

    fn strings<'s>(&mut self, strings: impl Iterator<Item = &'s str>) {
        let start = self.out.len();
        for s in strings {
            self.out.extend_from_slice(s.as_bytes());
            self.out.push(0);
        }
        self.align_from(start);
    }

    fn align_from(&mut self, start: usize) {
        let pad = padding_to_4(self.out.len() - start);
        self.out.extend(std::iter::repeat(0).take(pad));
    }
}

impl Dna {
    /// Decodes an SDNA block. `bytes` must start with the `SDNA` tag, anything
    /// after the struct table is ignored.
    pub fn from_sdna(bytes: &[u8], endianness: Endianness) -> std::result::Result<Dna, DnaParseError> {
        match DnaParseContext::new(endianness).dna(bytes) {
            Ok((_, dna)) => Ok(dna),
            Err(Err::Error(e)) | Err(Err::Failure(e)) if e.is_eof() => {
                Err(DnaParseError::NotEnoughData)
            }
            Err(Err::Error(e)) | Err(Err::Failure(e)) => Err(e),
            Err(Err::Incomplete(_)) => Err(DnaParseError::NotEnoughData),
        }
    }

    /// Encodes the tables as an SDNA block.
    pub fn to_sdna(&self, endianness: Endianness) -> std::result::Result<Vec<u8>, DnaParseError> {
        let mut w = Writer {
            out: Vec::new(),
            endianness,
        };
        w.out.extend_from_slice(b"SDNA");

        w.out.extend_from_slice(b"NAME");
        w.u32("name", self.names.len())?;
        w.strings(self.names.iter().map(String::as_str));

        w.out.extend_from_slice(b"TYPE");
        w.u32("type", self.types.len())?;
        w.strings(self.types.iter().map(|t| t.name.as_str()));

        w.out.extend_from_slice(b"TLEN");
        let start = w.out.len();
        for t in &self.types {
            w.u16("type length", t.bytes_len)?;
        }
        w.align_from(start);

        w.out.extend_from_slice(b"STRC");
        w.u32("struct", self.structs.len())?;
        for s in &self.structs {
            w.u16("type index", s.type_index)?;
            w.u16("field", s.fields.len())?;
            for f in &s.fields {
                w.u16("type index", f.type_index)?;
                w.u16("name index", f.name_index)?;
            }
        }

        Ok(w.out)
    }

    pub fn type_name(&self, index: usize) -> Option<&str> {
        self.types.get(index).map(|t| t.name.as_str())
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}
