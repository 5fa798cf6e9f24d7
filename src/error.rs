use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Ways a member header can be malformed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("not a gzip member (bad magic, unsupported method or short header)")]
    NotGzip,

    #[error("truncated FEXTRA field")]
    TruncatedExtra,

    #[error("truncated FNAME field")]
    TruncatedName,

    #[error("truncated FCOMMENT field")]
    TruncatedComment,

    #[error("truncated FHCRC field")]
    TruncatedCrc,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("cannot read directory entry: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = ::std::result::Result<T, Error>;
