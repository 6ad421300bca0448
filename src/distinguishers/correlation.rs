//! Pearson correlation coefficient.
//!
//! Both operands of a correlation are mean-centred once ([`Centered`]); the coefficient is then
//! the cosine of the two centred vectors. Vectors with zero variance have no defined correlation,
//! which is reported as `None` instead of a NaN.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// A mean-centred vector along with its euclidean norm.
#[derive(Debug, Clone)]
pub struct Centered {
    values: Array1<f64>,
    /// `None` when the vector has zero variance
    norm: Option<f64>,
}

impl Centered {
    /// The vector is divided by its largest magnitude before centring, so sums of squares stay
    /// finite for any finite input. The correlation does not depend on this scale.
    pub fn new(x: ArrayView1<f64>) -> Self {
        let scale = x.iter().fold(0.0, |m: f64, &v| m.max(v.abs()));
        let scaled = if scale > 0.0 && scale.is_finite() {
            x.mapv(|v| v / scale)
        } else {
            x.to_owned()
        };
        let Some(mean) = scaled.mean() else {
            return Self {
                values: Array1::zeros(0),
                norm: None,
            };
        };

        let values = scaled.mapv(|v| v - mean);
        let norm = if is_constant(x) {
            None
        } else {
            Some(values.dot(&values).sqrt()).filter(|&n| n > 0.0 && n.is_finite())
        };

        Self { values, norm }
    }

    pub fn values(&self) -> ArrayView1<f64> {
        self.values.view()
    }

    /// Returns the norm of the centred vector, or `None` if the vector has zero variance.
    pub fn norm(&self) -> Option<f64> {
        self.norm
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pearson correlation coefficient with another centred vector.
    ///
    /// Returns `None` if the lengths differ or if either vector has zero variance.
    pub fn correlate(&self, other: &Centered) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        let norm = self.norm? * other.norm?;

        Some(clamp_corr(self.values.dot(&other.values) / norm))
    }
}

/// Computes the Pearson correlation coefficient of `x` and `y`.
///
/// Returns `None` if the inputs are empty, of different lengths, or if either has zero variance.
///
/// # Examples
/// ```
/// use aes_cpa::distinguishers::correlation::pearson;
/// use ndarray::array;
///
/// let x = array![1.0, 2.0, 3.0, 4.0];
/// let y = array![2.0, 4.0, 6.0, 8.5];
/// assert!(pearson(x.view(), y.view()).unwrap() > 0.99);
/// assert_eq!(pearson(x.view(), array![1.0, 1.0, 1.0, 1.0].view()), None);
/// ```
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Option<f64> {
    Centered::new(x).correlate(&Centered::new(y))
}

/// Every time-offset column of a sample matrix, centred once so that the correlation of a
/// hypothesis with all columns costs a single matrix-vector product.
#[derive(Debug, Clone)]
pub struct SampleColumns {
    /// Centred samples, shape `(trace_count, sample_count)`
    centered: Array2<f64>,
    /// Norm of each centred column, `None` for flat columns
    norms: Vec<Option<f64>>,
}

impl SampleColumns {
    pub fn new(samples: ArrayView2<f64>) -> Self {
        let mut centered = Array2::zeros(samples.raw_dim());
        let mut norms = Vec::with_capacity(samples.shape()[1]);
        for (j, column) in samples.axis_iter(Axis(1)).enumerate() {
            let c = Centered::new(column);
            centered.column_mut(j).assign(&c.values);
            norms.push(c.norm);
        }

        Self { centered, norms }
    }

    pub fn trace_count(&self) -> usize {
        self.centered.shape()[0]
    }

    pub fn sample_count(&self) -> usize {
        self.centered.shape()[1]
    }

    /// Correlation of `hypothesis` with every column, in time-offset order.
    ///
    /// # Panics
    /// Panic if `hypothesis.len() != self.trace_count()`.
    pub fn correlate(&self, hypothesis: &Centered) -> Vec<Option<f64>> {
        assert_eq!(hypothesis.len(), self.trace_count());

        let Some(hypothesis_norm) = hypothesis.norm() else {
            return vec![None; self.sample_count()];
        };

        let cov = hypothesis.values().dot(&self.centered);
        cov.iter()
            .zip(&self.norms)
            .map(|(&c, norm)| norm.map(|n| clamp_corr(c / (hypothesis_norm * n))))
            .collect()
    }
}

fn is_constant(x: ArrayView1<f64>) -> bool {
    match x.first() {
        Some(&first) => x.iter().all(|&v| v == first),
        None => true,
    }
}

/// Rounding can push a perfect correlation slightly outside of [-1, 1].
fn clamp_corr(r: f64) -> f64 {
    r.clamp(-1.0, 1.0)
}
