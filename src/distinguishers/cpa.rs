use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    distinguishers::correlation::{Centered, SampleColumns},
    leakage_model::predict,
    trace::{BLOCK_SIZE, Dataset},
    util::{argmax_by, argsort_by},
};

/// Number of candidate values for a key byte.
pub const GUESS_RANGE: usize = 256;

/// Best correlation reached by one key byte candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Key byte guess
    pub candidate: u8,
    /// Maximum absolute Pearson correlation over all time offsets, in [0, 1]
    pub confidence: f64,
}

/// Recovered key byte for one position of the key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ByteResult {
    /// Position of the byte in the key, in `0..16`
    pub position: usize,
    /// Winning candidate
    pub best: CandidateScore,
}

/// Result of the CPA[^1] of one key byte: the score of every candidate.
///
/// [^1]: <https://www.iacr.org/archive/ches2004/31560016/31560016.pdf>
#[derive(Debug, Clone)]
pub struct CandidateScores {
    position: usize,
    /// Maximum absolute correlation per candidate
    max_corr: Array1<f64>,
    /// Number of (candidate, time offset) pairs without a defined correlation
    undefined: usize,
}

impl CandidateScores {
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the maximum absolute correlation for each candidate.
    pub fn max_corr(&self) -> ArrayView1<f64> {
        self.max_corr.view()
    }

    /// Return the confidence of a given candidate.
    pub fn confidence(&self, candidate: u8) -> f64 {
        self.max_corr[candidate as usize]
    }

    /// Return the number of correlations that were undefined because of zero variance.
    pub fn undefined(&self) -> usize {
        self.undefined
    }

    /// Return the candidate with the highest confidence.
    ///
    /// On equal confidence the lowest candidate wins.
    pub fn best(&self) -> ByteResult {
        let candidate = argmax_by(self.max_corr.view(), f64::total_cmp);

        ByteResult {
            position: self.position,
            best: CandidateScore {
                candidate: candidate as u8,
                confidence: self.max_corr[candidate],
            },
        }
    }

    /// Rank candidates by decreasing confidence, lowest candidate first on equal confidence.
    pub fn rank(&self) -> Vec<u8> {
        argsort_by(self.max_corr.as_slice().unwrap_or(&[]), |a, b| b.total_cmp(a))
            .into_iter()
            .map(|candidate| candidate as u8)
            .collect()
    }
}

/// Recovers key bytes from a [`Dataset`] by correlating a leakage model with the samples.
///
/// The dataset columns are centred once at construction and shared by every
/// [`KeyByteSolver::solve`] call, which makes a solver cheap to share between workers.
pub struct KeyByteSolver<'a, F = fn(u8, u8) -> u8>
where
    F: Fn(u8, u8) -> u8,
{
    dataset: &'a Dataset,
    columns: SampleColumns,
    /// Leakage model
    leakage_func: F,
}

impl<'a> KeyByteSolver<'a> {
    /// Creates a solver targeting the Hamming weight of the first round S-box output.
    pub fn new(dataset: &'a Dataset) -> Self {
        Self::with_leakage_model(dataset, predict)
    }
}

impl<'a, F> KeyByteSolver<'a, F>
where
    F: Fn(u8, u8) -> u8,
{
    pub fn with_leakage_model(dataset: &'a Dataset, leakage_func: F) -> Self {
        Self {
            dataset,
            columns: SampleColumns::new(dataset.samples()),
            leakage_func,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset
    }

    /// Computes the hypothetical leakage of every trace for a key byte guess.
    pub fn hypothesis(&self, position: usize, candidate: u8) -> Array1<u8> {
        self.dataset
            .plaintext_bytes(position)
            .mapv(|plaintext_byte| (self.leakage_func)(plaintext_byte, candidate))
    }

    /// Scores every candidate for the key byte at `position`.
    ///
    /// # Panics
    /// Panic if `position >= BLOCK_SIZE`.
    pub fn scores(&self, position: usize) -> CandidateScores {
        assert!(position < BLOCK_SIZE, "key byte position out of range");

        let mut max_corr = Array1::zeros(GUESS_RANGE);
        let mut undefined = 0;
        for candidate in 0..GUESS_RANGE {
            let hypothesis = self.hypothesis(position, candidate as u8).mapv(f64::from);
            let hypothesis = Centered::new(hypothesis.view());

            let mut best = 0.0;
            for corr in self.columns.correlate(&hypothesis) {
                match corr {
                    Some(r) if r.abs() > best => best = r.abs(),
                    Some(_) => {}
                    None => undefined += 1,
                }
            }
            max_corr[candidate] = best;
        }

        if undefined > 0 {
            debug!(position, undefined, "undefined correlations treated as zero confidence");
        }

        CandidateScores {
            position,
            max_corr,
            undefined,
        }
    }

    /// Returns the candidate whose hypothesis correlates best with the samples at any offset.
    ///
    /// # Panics
    /// Panic if `position >= BLOCK_SIZE`.
    pub fn solve(&self, position: usize) -> ByteResult {
        self.scores(position).best()
    }
}
