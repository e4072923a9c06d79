use std::io;

use thiserror::Error;

use crate::mutants::MutantId;

/// Failures while loading or querying the mutation tree.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("malformed mutation description: {0}")]
    MalformedDescription(String),
    #[error("mutant {id} is out of range (mutation tree has {total} mutants)")]
    OutOfRange { id: MutantId, total: usize },
}

#[derive(Debug, Error)]
pub enum KillerError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to render interestingness test: {0}")]
    Template(#[from] askama::Error),
    #[error("cannot search for kills in an empty batch")]
    EmptyBatch,
    #[error("kill bookkeeping out of sync: {killed} killed + {unkilled} unkilled != {total} mutants")]
    InvariantViolation {
        killed: usize,
        unkilled: usize,
        total: usize,
    },
}

impl KillerError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        KillerError::Io {
            context: context.into(),
            source,
        }
    }
}
