//! Convenient utility functions.

use std::cmp::Ordering;

use ndarray::ArrayView1;

#[cfg(feature = "progress_bar")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress_bar")]
use std::time::Duration;

/// Creates a [`ProgressBar`] with a predefined default style.
#[cfg(feature = "progress_bar")]
pub fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{elapsed_precise} {wide_bar} {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let progress_bar = ProgressBar::new(len as u64).with_style(style);
    progress_bar.enable_steady_tick(Duration::new(0, 100000000));
    progress_bar
}

/// Return the indices that would sort the given array with a comparison function.
///
/// The sort is stable: equal elements keep their index order.
pub fn argsort_by<T, F>(data: &[T], compare: F) -> Vec<usize>
where
    F: Fn(&T, &T) -> Ordering,
{
    let mut indices: Vec<usize> = (0..data.len()).collect();

    indices.sort_by(|&a, &b| compare(&data[a], &data[b]));

    indices
}

/// Return the index of the maximum value in the given array.
///
/// The first maximum wins on equality. Returns 0 for an empty array.
pub fn argmax_by<T, F>(array: ArrayView1<T>, compare: F) -> usize
where
    F: Fn(&T, &T) -> Ordering,
{
    let mut idx_max = 0;

    for i in 0..array.len() {
        if compare(&array[i], &array[idx_max]).is_gt() {
            idx_max = i;
        }
    }

    idx_max
}

/// Formats a duration the way the run reports elapsed time, e.g. `2m 3.5s`.
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs_f64();
    format!("{}m {:.1}s", (secs / 60.0).floor(), secs % 60.0)
}
