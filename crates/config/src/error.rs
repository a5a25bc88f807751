use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("missing required setting {_0}")]
    MissingCredential(#[error(not(source))] &'static str),
    #[display("invalid value for {_0}")]
    InvalidCredential(#[error(not(source))] &'static str),
    #[display("configuration file not found: {}", _0.display())]
    MissingFile(#[error(not(source))] PathBuf),
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    #[display("failed to load configuration")]
    Load,
}
