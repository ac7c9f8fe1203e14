use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sift error: {0}")]
    Sift(#[from] sift::Error),

    #[error("I/O error reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data file must hold a JSON array of records")]
    NotAnArray,
}
