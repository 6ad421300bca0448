//! Presentation of the recovered key bytes.
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};

#[cfg(feature = "progress_bar")]
use indicatif::ProgressBar;

use crate::{
    Error,
    distinguishers::cpa::{ByteResult, CandidateScore},
    trace::BLOCK_SIZE,
    util::format_elapsed,
};

/// Consumes [`ByteResult`]s as the jobs complete.
pub trait Reporter {
    /// `elapsed` is measured from the start of the run.
    fn report(&mut self, result: &ByteResult, elapsed: Duration);
}

/// Collects results in arrival order.
impl Reporter for Vec<ByteResult> {
    fn report(&mut self, result: &ByteResult, _elapsed: Duration) {
        self.push(*result);
    }
}

/// Prints one line per recovered byte on stdout.
pub struct ConsoleReporter {
    #[cfg(feature = "progress_bar")]
    progress_bar: ProgressBar,
}

impl ConsoleReporter {
    /// Creates a reporter expecting `jobs` results.
    #[allow(unused_variables)]
    pub fn new(jobs: usize) -> Self {
        Self {
            #[cfg(feature = "progress_bar")]
            progress_bar: crate::util::progress_bar(jobs),
        }
    }

    fn format(result: &ByteResult, elapsed: Duration) -> String {
        format!(
            "byte #{}, with value {} (0x{:02x}), correlation {:.6}\ntime: {}",
            result.position,
            result.best.candidate,
            result.best.candidate,
            result.best.confidence,
            format_elapsed(elapsed)
        )
    }

    pub fn finish(&self) {
        #[cfg(feature = "progress_bar")]
        self.progress_bar.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, result: &ByteResult, elapsed: Duration) {
        let line = Self::format(result, elapsed);

        #[cfg(feature = "progress_bar")]
        {
            self.progress_bar.println(line);
            self.progress_bar.inc(1);
        }
        #[cfg(not(feature = "progress_bar"))]
        println!("{line}");
    }
}

/// Full key guess assembled from the per-byte results, in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGuess {
    bytes: [CandidateScore; BLOCK_SIZE],
}

impl KeyGuess {
    /// Assembles a key from results given in any order.
    ///
    /// Fails if any position is missing.
    pub fn from_results(results: &[ByteResult]) -> Result<Self, Error> {
        let mut bytes: [Option<CandidateScore>; BLOCK_SIZE] = [None; BLOCK_SIZE];
        for result in results {
            let slot = bytes
                .get_mut(result.position)
                .ok_or(Error::InvalidPosition(result.position))?;
            *slot = Some(result.best);
        }

        let missing: Vec<usize> = (0..BLOCK_SIZE).filter(|&i| bytes[i].is_none()).collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteKey { missing });
        }

        Ok(Self {
            bytes: bytes.map(|b| {
                b.unwrap_or(CandidateScore {
                    candidate: 0,
                    confidence: 0.0,
                })
            }),
        })
    }

    /// Returns the key bytes.
    pub fn key(&self) -> [u8; BLOCK_SIZE] {
        self.bytes.map(|b| b.candidate)
    }

    /// Returns the score of each key byte.
    pub fn scores(&self) -> &[CandidateScore; BLOCK_SIZE] {
        &self.bytes
    }

    /// Returns the lowest confidence among the key bytes.
    pub fn min_confidence(&self) -> f64 {
        self.bytes
            .iter()
            .map(|b| b.confidence)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key())
    }

    /// Save the [`KeyGuess`] to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;

        Ok(())
    }

    /// Load a [`KeyGuess`] from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        let guess: KeyGuess = serde_json::from_reader(file)?;

        Ok(guess)
    }
}
