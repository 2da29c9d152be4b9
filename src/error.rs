use crate::{
    layout::LayoutError, model::ModelError, parsers::DnaParseError, record::RecordError,
    schema::SchemaError,
};
use thiserror::Error;

/// Any error this crate can return.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] DnaParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, Error>;
