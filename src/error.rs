use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Empty dataset: {traces} traces of {samples} samples")]
    EmptyDataset { traces: usize, samples: usize },
    #[error("Trace {index} has {found} {field}, expected {expected}")]
    DataShape {
        index: usize,
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Key byte position {0} is out of range")]
    InvalidPosition(usize),
    #[error("Key byte position {0} is scheduled more than once")]
    DuplicatePosition(usize),
    #[error("Key guess is missing positions {missing:?}")]
    IncompleteKey { missing: Vec<usize> },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to save/load aes-cpa data")]
    SaveLoadError(#[from] serde_json::Error),
    #[error("Failed to read npy array")]
    Npy(#[from] ndarray_npy::ReadNpyError),
    #[error(transparent)]
    IoError(#[from] io::Error),
}
