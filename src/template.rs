//! Specialization of the kernel source for one input size.
//!
//! The kernel text carries four placeholder tokens that are replaced by the
//! literal values of a [`KernelParameters`] record. The twiddle angle is emitted
//! as a hexadecimal float literal so that every device compiler sees the exact
//! same single-precision value, with no decimal rounding in between.

use std::path::Path;

use crate::params::KernelParameters;

/// Kernel source shipped with the crate.
pub const STOCKHAM_IMAGES_SOURCE: &str = include_str!("../kernels/stockham_images.cl");

/// Name of the kernel function in [`STOCKHAM_IMAGES_SOURCE`].
pub const ENTRY_POINT: &str = "kernel_func";

pub const MINUS_PI_OVER_N_TOKEN: &str = "replace_MINUS_PI_over_N_GLOBAL_BUTTERFLIES";
pub const LOG2_N_TOKEN: &str = "replace_LOG2_N_GLOBAL_BUTTERFLIES";
pub const N_GLOBAL_TOKEN: &str = "replace_N_GLOBAL_BUTTERFLIES";
pub const N_LOCAL_TOKEN: &str = "replace_N_LOCAL_BUTTERFLIES";

/// Every placeholder, longest first.
pub const PLACEHOLDERS: [&str; 4] = [
    MINUS_PI_OVER_N_TOKEN,
    LOG2_N_TOKEN,
    N_GLOBAL_TOKEN,
    N_LOCAL_TOKEN,
];

const PLACEHOLDER_PREFIX: &str = "replace_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("kernel template has no `{0}` placeholder")]
    MissingPlaceholder(&'static str),
    #[error("placeholder `{0}` survived substitution")]
    UnresolvedPlaceholder(String),
}

/// Immutable kernel source with placeholder tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelTemplate {
    text: String,
}

impl Default for KernelTemplate {
    fn default() -> Self {
        Self {
            text: STOCKHAM_IMAGES_SOURCE.to_string(),
        }
    }
}

impl KernelTemplate {
    /// Wraps `text`, checking that it mentions every placeholder.
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        if let Some(missing) = PLACEHOLDERS.iter().find(|token| !text.contains(*token)) {
            return Err(TemplateError::MissingPlaceholder(missing));
        }
        Ok(Self { text })
    }

    /// Reads a template from disk.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(text)?)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Produces compilable source for `params`.
    pub fn render(&self, params: &KernelParameters) -> Result<String, TemplateError> {
        let substitutions = [
            (
                MINUS_PI_OVER_N_TOKEN,
                format!("{}f", hex_float(params.minus_pi_over_n)),
            ),
            (
                LOG2_N_TOKEN,
                params.log2_n_global_butterflies.to_string(),
            ),
            (N_GLOBAL_TOKEN, params.n_global_butterflies.to_string()),
            (N_LOCAL_TOKEN, params.butterflies_per_thread.to_string()),
        ];

        let source = substitutions
            .iter()
            .fold(self.text.clone(), |source, (token, value)| {
                source.replace(token, value)
            });

        match unresolved_placeholder(&source) {
            Some(token) => Err(TemplateError::UnresolvedPlaceholder(token.to_string())),
            None => Ok(source),
        }
    }
}

/// First identifier in `source` that still looks like a placeholder.
fn unresolved_placeholder(source: &str) -> Option<&str> {
    let start = source.find(PLACEHOLDER_PREFIX)?;
    let rest = &source[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Formats `x` the way C's `%a` does, e.g. `-0x1.921fb6p-1` for `-pi / 4`.
///
/// # Panics
///
/// Panics if `x` is not finite.
pub fn hex_float(x: f32) -> String {
    assert!(x.is_finite(), "{x} has no hexadecimal float literal");

    let bits = x.to_bits();
    let sign = if bits >> 31 == 1 { "-" } else { "" };
    let biased_exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if biased_exp == 0 && mantissa == 0 {
        return format!("{sign}0x0p+0");
    }

    let (lead, exp) = if biased_exp == 0 {
        (0, -126)
    } else {
        (1, biased_exp - 127)
    };

    // 23 mantissa bits, shifted to fill 6 hex digits
    let digits = format!("{:06x}", mantissa << 1);
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        format!("{sign}0x{lead}p{exp:+}")
    } else {
        format!("{sign}0x{lead}.{digits}p{exp:+}")
    }
}

/// Decodes a hexadecimal float literal produced by [`hex_float`], with or
/// without a trailing `f` suffix.
pub fn parse_hex_float(literal: &str) -> Option<f32> {
    let literal = literal.trim().trim_end_matches(['f', 'F']);
    let (negative, literal) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let literal = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))?;
    let (mantissa, exp) = literal.split_once(['p', 'P'])?;
    let exp: i32 = exp.parse().ok()?;
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() || int_part.len() + frac_part.len() > 15 {
        return None;
    }

    let mut value: u64 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        value = (value << 4) | u64::from(c.to_digit(16)?);
    }
    let scale = exp - 4 * frac_part.len() as i32;
    let magnitude = value as f64 * 2f64.powi(scale);
    let x = magnitude as f32;
    Some(if negative { -x } else { x })
}
