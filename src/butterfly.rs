//! Host-side models of the butterfly network the device kernel runs.
//!
//! Two models are provided:
//!
//! - [`cpu_butterfly_fft`] is the bare radix-2 decimation-in-time network in
//!   double precision. It expects its input already in bit-reversed order and
//!   produces the transform in natural order.
//! - [`simulate_kernel`] replays the device kernel thread by thread, stage by
//!   stage, in single precision, including the bit-reversed reads it does while
//!   widening the real input. Its output is what a correct device returns.
//!
//! ## Indexing
//!
//! At stage `i` (`i = 1, 2, 4, ..., N/2`), butterfly `k` combines positions
//! `idx = i * (k / i) + k` and `idx + i` with twiddle `t = (k % i) * (N / 2 / i)`.
//! Every butterfly of a stage touches a distinct pair, so threads only have to
//! synchronize between stages.
use num_complex::{Complex, Complex32, Complex64};
use num_traits::Float;

use crate::params::KernelParameters;

/// Positions and twiddle index of butterfly `k` at stage `i`.
#[inline]
pub fn butterfly_indices(k: usize, i: usize, n_global_butterflies: usize) -> (usize, usize) {
    let idx = i * (k / i) + k;
    let t = (k % i) * (n_global_butterflies / i);
    (idx, t)
}

/// Reverses the lowest `bits` bits of `k`.
#[inline]
pub fn reverse_bits(k: usize, bits: u32) -> usize {
    if bits == 0 {
        0
    } else {
        k.reverse_bits() >> (usize::BITS - bits)
    }
}

/// Twiddle factors `exp(-i * pi * j / dist)` for `j` in `0..dist`.
fn generate_twiddles(dist: usize) -> (Vec<f64>, Vec<f64>) {
    let angle_mult = -std::f64::consts::PI / dist as f64;
    (0..dist)
        .map(|j| {
            let (sin, cos) = (angle_mult * j as f64).sin_cos();
            (cos, sin)
        })
        .unzip()
}

/// One decimation-in-time stage over chunks of `2 * dist` elements.
#[multiversion::multiversion(targets(
    "x86_64+avx512f+avx512bw+avx512cd+avx512dq+avx512vl",
    "x86_64+avx2+fma",
    "x86_64+sse4.2",
    "x86+avx2+fma",
    "x86+sse4.2",
    "x86+sse2",
    "aarch64+neon",
))]
#[inline]
pub fn fft_dit_chunk_n<T: Float>(
    reals: &mut [T],
    imags: &mut [T],
    twiddles_re: &[T],
    twiddles_im: &[T],
    dist: usize,
) {
    let chunk_size = dist << 1;

    reals
        .chunks_exact_mut(chunk_size)
        .zip(imags.chunks_exact_mut(chunk_size))
        .for_each(|(reals_chunk, imags_chunk)| {
            let (reals_s0, reals_s1) = reals_chunk.split_at_mut(dist);
            let (imags_s0, imags_s1) = imags_chunk.split_at_mut(dist);

            reals_s0
                .iter_mut()
                .zip(reals_s1.iter_mut())
                .zip(imags_s0.iter_mut())
                .zip(imags_s1.iter_mut())
                .zip(twiddles_re.iter())
                .zip(twiddles_im.iter())
                .for_each(|(((((re_s0, re_s1), im_s0), im_s1), &w_re), &w_im)| {
                    let b_re = *re_s1 * w_re - *im_s1 * w_im;
                    let b_im = *re_s1 * w_im + *im_s1 * w_re;
                    let a_re = *re_s0;
                    let a_im = *im_s0;

                    *re_s0 = a_re + b_re;
                    *im_s0 = a_im + b_im;
                    *re_s1 = a_re - b_re;
                    *im_s1 = a_im - b_im;
                });
        });
}

/// Forward FFT of a real signal that is already in bit-reversed order.
///
/// # Panics
///
/// Panics if `bit_reversed.len()` is not a power of two.
pub fn cpu_butterfly_fft(bit_reversed: &[f32]) -> Vec<Complex64> {
    let n = bit_reversed.len();
    assert!(n.is_power_of_two());

    let mut reals: Vec<f64> = bit_reversed.iter().map(|&x| f64::from(x)).collect();
    let mut imags = vec![0.0; n];

    let mut dist = 1;
    while dist < n {
        let (twiddles_re, twiddles_im) = generate_twiddles(dist);
        fft_dit_chunk_n(&mut reals, &mut imags, &twiddles_re, &twiddles_im, dist);
        dist <<= 1;
    }

    reals
        .into_iter()
        .zip(imags)
        .map(|(re, im)| Complex::new(re, im))
        .collect()
}

/// Runs the device kernel's algorithm on the host.
///
/// Threads are replayed one after the other within a stage, and a stage only
/// starts once every thread finished the previous one, which is exactly the
/// ordering the kernel's barriers guarantee.
///
/// # Panics
///
/// Panics if `input.len()` does not match `params.size`.
pub fn simulate_kernel(params: &KernelParameters, input: &[f32]) -> Vec<Complex32> {
    assert_eq!(input.len(), params.size.get());

    let ngb = params.n_global_butterflies;
    let threads = params.threads();
    let owned = |g: usize| (0..params.butterflies_per_thread).map(move |j| g + j * threads);

    let mut x = vec![Complex32::default(); 2 * ngb];

    for g in 0..threads {
        for k in owned(g) {
            let r = reverse_bits(k, params.log2_n_global_butterflies);
            x[2 * k] = Complex::new(input[r], 0.0);
            x[2 * k + 1] = Complex::new(input[r + ngb], 0.0);
        }
    }

    let mut i = 1;
    while i <= ngb {
        for g in 0..threads {
            for k in owned(g) {
                let (idx, t) = butterfly_indices(k, i, ngb);
                let (w_re, w_im) = params.twiddle(t);
                let a = x[idx];
                let b = x[idx + i] * Complex::new(w_re, w_im);
                x[idx] = a + b;
                x[idx + i] = a - b;
            }
        }
        i <<= 1;
    }

    x
}
