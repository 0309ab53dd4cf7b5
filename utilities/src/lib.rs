// export rustfft to stockham-cl
pub extern crate rustfft;

use rand::{distributions::Uniform, prelude::*};
use rustfft::num_complex::{Complex32, Complex64};
use rustfft::num_traits::Float;
use rustfft::FftPlanner;

/// Asserts that two fp numbers are approximately equal.
///
/// # Panics
///
/// Panics if `actual` and `expected` are too far from each other
#[allow(dead_code)]
#[track_caller]
pub fn assert_float_closeness<T: Float + std::fmt::Display>(actual: T, expected: T, epsilon: T) {
    if (actual - expected).abs() >= epsilon {
        panic!(
            "Assertion failed: {actual} too far from expected value {expected} (with epsilon {epsilon})",
        );
    }
}

/// Generate a reproducible, real signal of `len` samples drawn uniformly from `[0, 1)`.
///
/// The same `seed` always yields the same signal, so benchmark runs can be compared
/// across devices and builds.
pub fn gen_random_input(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let uniform_dist = Uniform::new(0.0f32, 1.0f32);
    (0..len).map(|_| uniform_dist.sample(&mut rng)).collect()
}

/// Forward FFT of a real signal, computed by `rustfft` in double precision.
pub fn reference_fft_f64(input: &[f32]) -> Vec<Complex64> {
    let mut buffer: Vec<Complex64> = input
        .iter()
        .map(|&x| Complex64::new(f64::from(x), 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);
    buffer
}

/// Forward FFT of a real signal, rounded to single precision.
pub fn reference_fft(input: &[f32]) -> Vec<Complex32> {
    reference_fft_f64(input)
        .into_iter()
        .map(|z| Complex32::new(z.re as f32, z.im as f32))
        .collect()
}

/// Returns a copy of `input` permuted into bit-reversed index order.
///
/// # Panics
///
/// Panics if `input.len()` is not a power of two.
pub fn bit_reverse<T: Clone>(input: &[T]) -> Vec<T> {
    let n = input.len();
    assert!(n == 0 || n.is_power_of_two());

    let mut buf = input.to_vec();
    let mut j = 0;

    for i in 1..n {
        let mut bit = n >> 1;

        while (j & bit) != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;

        if i < j {
            buf.swap(i, j);
        }
    }
    buf
}
