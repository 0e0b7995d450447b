//! FNV-1a Result Digests
//!
//! Runners digest their output with 32-bit FNV-1a so both variants can be
//! checked for functional equivalence without shipping the output itself.
//! Floating-point results are rounded to a fixed number of decimal places and
//! hashed as little-endian `i32`s, which keeps digests stable across
//! implementations that differ only in the last ulp.

/// FNV-1a 32-bit offset basis
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime
pub const FNV_PRIME: u32 = 16_777_619;

/// Decimal places kept when digesting floating-point output
pub const DEFAULT_PRECISION_DIGITS: u32 = 6;

/// Incremental FNV-1a 32-bit hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv1a(u32);

impl Default for Fnv1a {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Fnv1a {
    /// Hasher at the offset basis
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= byte as u32;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    /// Feed one `f32`, rounded to `precision_digits` decimal places
    pub fn update_f32(&mut self, value: f32, precision_digits: u32) {
        self.update(&round_f32_to_precision(value, precision_digits).to_le_bytes());
    }

    /// Current digest
    pub fn finish(&self) -> u32 {
        self.0
    }
}

/// Digest of a byte string
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Round to `precision_digits` decimal places and scale to an integer
///
/// The scaled value saturates at `i32::MIN..=i32::MAX`, so at 6 digits any
/// magnitude beyond ~2147.48 maps to the same integer and those values are
/// indistinguishable in a digest. Lower the precision for larger outputs.
/// NaN maps to 0.
pub fn round_f32_to_precision(value: f32, precision_digits: u32) -> i32 {
    let multiplier = 10f64.powi(precision_digits as i32);
    ((value as f64) * multiplier).round() as i32
}

/// Digest of a sequence of `f32` values in iteration order
pub fn digest_f32s<'a, I>(values: I, precision_digits: u32) -> u32
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut hasher = Fnv1a::new();
    for &value in values {
        hasher.update_f32(value, precision_digits);
    }
    hasher.finish()
}
