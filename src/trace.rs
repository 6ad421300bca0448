//! Recorded power traces and the dataset shared by the solvers.
use ndarray::{Array2, ArrayView1, ArrayView2};
use ndarray_npy::read_npy;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use tracing::info;

use crate::Error;

/// Number of bytes in an AES block, hence in the plaintext of each trace.
pub const BLOCK_SIZE: usize = 16;

/// A single recorded encryption.
///
/// Field names follow the acquisition JSON format (`pt`, `ct`, `pm`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Encrypted plaintext
    #[serde(rename = "pt")]
    pub plaintext: Vec<u8>,
    /// Resulting ciphertext
    #[serde(rename = "ct", default)]
    pub ciphertext: Vec<u8>,
    /// Power measurements
    #[serde(rename = "pm")]
    pub samples: Vec<f64>,
}

impl TraceRecord {
    pub fn new(plaintext: Vec<u8>, ciphertext: Vec<u8>, samples: Vec<f64>) -> Self {
        Self {
            plaintext,
            ciphertext,
            samples,
        }
    }

    /// Returns the number of points in the power waveform.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Immutable set of traces, one row per trace.
///
/// A [`Dataset`] can only be built through validating constructors: every trace has a
/// [`BLOCK_SIZE`] bytes plaintext and the same, non-zero, number of samples.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Plaintexts, shape `(trace_count, BLOCK_SIZE)`
    plaintexts: Array2<u8>,
    /// Power samples, shape `(trace_count, sample_count)`
    samples: Array2<f64>,
}

impl Dataset {
    /// Builds a dataset from parsed records.
    pub fn from_records(records: &[TraceRecord]) -> Result<Self, Error> {
        let Some(first) = records.first() else {
            return Err(Error::EmptyDataset {
                traces: 0,
                samples: 0,
            });
        };
        let sample_count = first.len();
        if records.iter().all(TraceRecord::is_empty) {
            return Err(Error::EmptyDataset {
                traces: records.len(),
                samples: 0,
            });
        }

        for (index, record) in records.iter().enumerate() {
            if record.plaintext.len() != BLOCK_SIZE {
                return Err(Error::DataShape {
                    index,
                    field: "plaintext bytes",
                    expected: BLOCK_SIZE,
                    found: record.plaintext.len(),
                });
            }
            if record.len() != sample_count {
                return Err(Error::DataShape {
                    index,
                    field: "samples",
                    expected: sample_count,
                    found: record.len(),
                });
            }
        }

        let mut plaintexts = Array2::zeros((records.len(), BLOCK_SIZE));
        let mut samples = Array2::zeros((records.len(), sample_count));
        for (i, record) in records.iter().enumerate() {
            plaintexts
                .row_mut(i)
                .assign(&ArrayView1::from(&record.plaintext[..]));
            samples
                .row_mut(i)
                .assign(&ArrayView1::from(&record.samples[..]));
        }

        Ok(Self::log_loaded(Self {
            plaintexts,
            samples,
        }))
    }

    /// Builds a dataset from a plaintext matrix and a trace matrix sharing the same row count.
    pub fn from_arrays<T>(plaintexts: ArrayView2<u8>, traces: ArrayView2<T>) -> Result<Self, Error>
    where
        T: AsPrimitive<f64>,
    {
        let (trace_count, sample_count) = traces.dim();
        if trace_count == 0 || sample_count == 0 {
            return Err(Error::EmptyDataset {
                traces: trace_count,
                samples: sample_count,
            });
        }
        if plaintexts.shape()[0] != trace_count {
            return Err(Error::DataShape {
                index: plaintexts.shape()[0].min(trace_count),
                field: "plaintext rows",
                expected: trace_count,
                found: plaintexts.shape()[0],
            });
        }
        if plaintexts.shape()[1] != BLOCK_SIZE {
            return Err(Error::DataShape {
                index: 0,
                field: "plaintext bytes",
                expected: BLOCK_SIZE,
                found: plaintexts.shape()[1],
            });
        }

        Ok(Self::log_loaded(Self {
            plaintexts: plaintexts.to_owned(),
            samples: traces.mapv(|x| x.as_()),
        }))
    }

    /// Loads a JSON array of [`TraceRecord`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        let records: Vec<TraceRecord> = serde_json::from_reader(BufReader::new(file))?;

        Self::from_records(&records)
    }

    /// Loads `plaintexts.npy` (`u8`) and `traces.npy` (`f64`) from a directory.
    pub fn load_npy<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let plaintexts: Array2<u8> = read_npy(dir.join("plaintexts.npy"))?;
        let traces: Array2<f64> = read_npy(dir.join("traces.npy"))?;

        Self::from_arrays(plaintexts.view(), traces.view())
    }

    /// Loads a dataset from a JSON file or from an npy directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_npy(path)
        } else {
            Self::load_json(path)
        }
    }

    fn log_loaded(self) -> Self {
        info!(
            traces = self.trace_count(),
            plaintext_bytes = BLOCK_SIZE,
            samples = self.sample_count(),
            "dataset loaded"
        );
        self
    }

    /// Returns the number of traces.
    pub fn trace_count(&self) -> usize {
        self.samples.shape()[0]
    }

    /// Returns the number of samples per trace.
    pub fn sample_count(&self) -> usize {
        self.samples.shape()[1]
    }

    /// Returns the plaintext of trace `i`.
    pub fn plaintext(&self, i: usize) -> ArrayView1<u8> {
        self.plaintexts.row(i)
    }

    /// Returns the power samples of trace `i`.
    pub fn power_samples(&self, i: usize) -> ArrayView1<f64> {
        self.samples.row(i)
    }

    /// Returns the plaintext byte at `position` for every trace.
    pub fn plaintext_bytes(&self, position: usize) -> ArrayView1<u8> {
        self.plaintexts.column(position)
    }

    /// Returns the samples taken at time offset `j` across all traces.
    pub fn sample_column(&self, j: usize) -> ArrayView1<f64> {
        self.samples.column(j)
    }

    /// Returns the whole sample matrix.
    pub fn samples(&self) -> ArrayView2<f64> {
        self.samples.view()
    }
}

#[cfg(test)]
mod tests {
    use super::{BLOCK_SIZE, Dataset, TraceRecord};
    use crate::Error;
    use ndarray::{Array2, array};
    use ndarray_npy::write_npy;
    use std::{fs, path::PathBuf};

    fn record(first_byte: u8, samples: Vec<f64>) -> TraceRecord {
        let mut plaintext = vec![0u8; BLOCK_SIZE];
        plaintext[0] = first_byte;
        TraceRecord::new(plaintext, vec![0u8; BLOCK_SIZE], samples)
    }

    #[test]
    fn test_from_records() {
        let dataset = Dataset::from_records(&[
            record(1, vec![1.0, 2.0, 3.0]),
            record(2, vec![4.0, 5.0, 6.0]),
        ])
        .unwrap();

        assert_eq!(dataset.trace_count(), 2);
        assert_eq!(dataset.sample_count(), 3);
        assert_eq!(dataset.plaintext(1)[0], 2);
        assert_eq!(dataset.power_samples(1), array![4.0, 5.0, 6.0]);
        assert_eq!(dataset.sample_column(2), array![3.0, 6.0]);
        assert_eq!(dataset.plaintext_bytes(0), array![1u8, 2]);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(matches!(
            Dataset::from_records(&[]),
            Err(Error::EmptyDataset { traces: 0, .. })
        ));
        assert!(matches!(
            Dataset::from_records(&[record(0, vec![]), record(1, vec![])]),
            Err(Error::EmptyDataset {
                traces: 2,
                samples: 0
            })
        ));
        assert!(matches!(
            Dataset::from_arrays(Array2::<u8>::zeros((0, 16)).view(), Array2::<f64>::zeros((0, 4)).view()),
            Err(Error::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_empty_first_record_is_ragged() {
        let result = Dataset::from_records(&[record(0, vec![]), record(1, vec![1.0, 2.0, 3.0])]);
        assert!(matches!(
            result,
            Err(Error::DataShape {
                index: 1,
                field: "samples",
                expected: 0,
                found: 3
            })
        ));
    }

    #[test]
    fn test_ragged_samples() {
        let result = Dataset::from_records(&[
            record(1, vec![1.0, 2.0, 3.0]),
            record(2, vec![4.0, 5.0]),
        ]);
        assert!(matches!(
            result,
            Err(Error::DataShape {
                index: 1,
                field: "samples",
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_short_plaintext() {
        let mut short = record(1, vec![1.0]);
        short.plaintext.truncate(15);
        let result = Dataset::from_records(&[record(0, vec![1.0]), short]);
        assert!(matches!(
            result,
            Err(Error::DataShape {
                index: 1,
                field: "plaintext bytes",
                ..
            })
        ));
    }

    #[test]
    fn test_from_arrays_converts_samples() {
        let plaintexts = Array2::<u8>::zeros((2, BLOCK_SIZE));
        let traces = array![[1i16, -2], [3, 4]];
        let dataset = Dataset::from_arrays(plaintexts.view(), traces.view()).unwrap();

        assert_eq!(dataset.samples(), array![[1.0, -2.0], [3.0, 4.0]]);
    }

    #[test]
    fn test_from_arrays_mismatched_rows() {
        let plaintexts = Array2::<u8>::zeros((3, BLOCK_SIZE));
        let traces = Array2::<f64>::zeros((2, 5));
        assert!(matches!(
            Dataset::from_arrays(plaintexts.view(), traces.view()),
            Err(Error::DataShape {
                field: "plaintext rows",
                ..
            })
        ));
    }

    #[test]
    fn test_parse_json_records() {
        let json = r#"[{"pt": [0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15],
                        "ct": [15,14,13,12,11,10,9,8,7,6,5,4,3,2,1,0],
                        "pm": [0.5, -0.25]}]"#;
        let records: Vec<TraceRecord> = serde_json::from_str(json).unwrap();
        let dataset = Dataset::from_records(&records).unwrap();

        assert_eq!(records[0].ciphertext[0], 15);
        assert_eq!(dataset.plaintext(0)[15], 15);
        assert_eq!(dataset.power_samples(0), array![0.5, -0.25]);
    }

    /// Fresh directory under the system temp dir, unique per test and process.
    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("aes-cpa-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_json_file() {
        let dir = temp_dir("load-json");
        let path = dir.join("traces.json");
        let records = vec![
            record(7, vec![0.5, -0.25, 1.0]),
            record(9, vec![0.75, 0.0, -1.0]),
        ];
        fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let dataset = Dataset::load(&path).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(dataset.trace_count(), 2);
        assert_eq!(dataset.sample_count(), 3);
        assert_eq!(dataset.plaintext_bytes(0), array![7u8, 9]);
        assert_eq!(dataset.sample_column(2), array![1.0, -1.0]);
    }

    #[test]
    fn test_load_npy_dir() {
        let dir = temp_dir("load-npy");
        let mut plaintexts = Array2::<u8>::zeros((3, BLOCK_SIZE));
        plaintexts[[1, 4]] = 0xab;
        let traces = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.5]];
        write_npy(dir.join("plaintexts.npy"), &plaintexts).unwrap();
        write_npy(dir.join("traces.npy"), &traces).unwrap();

        let dataset = Dataset::load(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(dataset.trace_count(), 3);
        assert_eq!(dataset.plaintext(1)[4], 0xab);
        assert_eq!(dataset.samples(), traces);
    }

    #[test]
    fn test_load_npy_dir_missing_traces() {
        let dir = temp_dir("load-npy-missing");
        write_npy(
            dir.join("plaintexts.npy"),
            &Array2::<u8>::zeros((2, BLOCK_SIZE)),
        )
        .unwrap();

        let result = Dataset::load(&dir);
        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(result, Err(Error::Npy(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = temp_dir("load-missing");
        let result = Dataset::load(dir.join("does-not-exist.json"));
        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = temp_dir("load-malformed");
        let path = dir.join("traces.json");
        fs::write(&path, r#"[{"pt": [1, 2], "pm": "#).unwrap();

        let result = Dataset::load(&path);
        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(result, Err(Error::SaveLoadError(_))));
    }
}
