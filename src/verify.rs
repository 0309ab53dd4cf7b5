//! Correctness checks against the reference transform.
//!
//! Tolerances are absolute, not relative to the transform size. Floating point
//! errors add up at every multiplication, but butterflies mostly add and
//! subtract, where errors do not compound that way.
use num_complex::{Complex, Complex32};
use num_traits::Float;
use tracing::debug;
use utilities::{bit_reverse, reference_fft_f64};

use crate::butterfly::cpu_butterfly_fft;
use crate::error::{Error, Mismatch, Result};

/// Absolute tolerance between device output and the reference.
pub const DEVICE_TOLERANCE: f32 = 0.01;

/// Absolute tolerance between the host butterfly network and the reference.
pub const NETWORK_TOLERANCE: f64 = 1e-4;

/// Index of the first element whose real or imaginary part differs by
/// `tolerance` or more.
///
/// # Panics
///
/// Panics if the slices have different lengths.
pub fn first_mismatch<T: Float>(
    actual: &[Complex<T>],
    expected: &[Complex<T>],
    tolerance: T,
) -> Option<usize> {
    assert_eq!(actual.len(), expected.len());
    actual.iter().zip(expected).position(|(z, w)| {
        // also catches NaN, which compares false
        !((z.re - w.re).abs() < tolerance && (z.im - w.im).abs() < tolerance)
    })
}

/// Checks device `output` against `reference`.
pub fn verify_output(output: &[Complex32], reference: &[Complex32], tolerance: f32) -> Result<()> {
    match first_mismatch(output, reference, tolerance) {
        Some(index) => Err(Error::Verification(Mismatch {
            index,
            actual: output[index],
            expected: reference[index],
            tolerance,
        })),
        None => Ok(()),
    }
}

/// Checks that the butterfly network, fed with the bit-reversed `input`,
/// computes the reference transform.
///
/// The device kernel relies on this: it runs the same network and only
/// arranges its reads so that no host-side bit reversal is needed.
pub fn check_network_consistency(input: &[f32]) -> Result<()> {
    let expected = reference_fft_f64(input);
    let actual = cpu_butterfly_fft(&bit_reverse(input));
    if let Some(index) = first_mismatch(&actual, &expected, NETWORK_TOLERANCE) {
        let narrow = |z: Complex<f64>| Complex32::new(z.re as f32, z.im as f32);
        return Err(Error::Verification(Mismatch {
            index,
            actual: narrow(actual[index]),
            expected: narrow(expected[index]),
            tolerance: NETWORK_TOLERANCE as f32,
        }));
    }
    debug!(size = input.len(), "host network matches the reference");
    Ok(())
}

#[cfg(test)]
mod tests {
    use utilities::{gen_random_input, reference_fft};

    use super::*;

    #[test]
    fn identical_outputs_pass() {
        let reference = reference_fft(&gen_random_input(64, 0));
        assert!(verify_output(&reference, &reference, DEVICE_TOLERANCE).is_ok());
    }

    #[test]
    fn tolerance_is_absolute() {
        let expected = vec![Complex32::new(1000.0, -1000.0), Complex32::new(0.0, 0.0)];
        let mut actual = expected.clone();
        actual[0].re += 0.009;
        actual[1].im -= 0.009;
        assert!(verify_output(&actual, &expected, DEVICE_TOLERANCE).is_ok());

        actual[0].re += 0.002;
        let err = verify_output(&actual, &expected, DEVICE_TOLERANCE).unwrap_err();
        match err {
            Error::Verification(mismatch) => {
                assert_eq!(mismatch.index, 0);
                assert_eq!(mismatch.expected, expected[0]);
                assert_eq!(mismatch.tolerance, DEVICE_TOLERANCE);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn imaginary_part_is_checked() {
        let expected = vec![Complex32::new(0.0, 0.0); 4];
        let mut actual = expected.clone();
        actual[3].im = 0.5;
        assert_eq!(first_mismatch(&actual, &expected, 0.01), Some(3));
    }

    #[test]
    fn nan_is_a_mismatch() {
        let expected = vec![Complex32::new(0.0, 0.0); 2];
        let mut actual = expected.clone();
        actual[1].re = f32::NAN;
        assert_eq!(first_mismatch(&actual, &expected, 0.01), Some(1));
    }

    #[test]
    fn network_is_consistent_with_reference() {
        for log_n in 1..13 {
            check_network_consistency(&gen_random_input(1 << log_n, 0)).unwrap();
        }
    }
}
