//! Leakage models predicting the power drawn by the targeted computation.
pub mod aes;

/// Hamming weight of a byte.
pub fn hw(value: u8) -> u8 {
    value.count_ones() as u8
}

/// Predicted leakage of the first-round S-box output for a plaintext byte and a key byte guess.
///
/// Returns `hw(sbox(plaintext_byte ^ candidate))`, which always lies in `0..=8`.
pub fn predict(plaintext_byte: u8, candidate: u8) -> u8 {
    hw(aes::sbox(plaintext_byte ^ candidate))
}
