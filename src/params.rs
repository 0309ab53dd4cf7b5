//! Size-dependent constants of the butterfly kernel.

use std::f32::consts::PI;

use crate::error::{Error, Result};

/// Length of an input vector, checked to be a power of two and at least 2.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputSize(usize);

impl InputSize {
    pub fn new(n: usize) -> Result<Self> {
        if n >= 2 && n.is_power_of_two() {
            Ok(Self(n))
        } else {
            Err(Error::InvalidSize(n))
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    /// Number of butterflies in every stage of the network, `N / 2`.
    #[inline]
    pub fn n_global_butterflies(self) -> usize {
        self.0 >> 1
    }

    /// Size in bytes of the complex single-precision output.
    #[inline]
    pub fn output_bytes(self) -> u64 {
        (self.0 * 2 * std::mem::size_of::<f32>()) as u64
    }

    /// Local memory the kernel asks for: two output-sized scratch areas.
    #[inline]
    pub fn local_mem_required(self) -> u64 {
        2 * self.output_bytes()
    }
}

/// Everything the kernel template is specialized on.
///
/// Derived deterministically from the input size and the number of
/// butterflies each thread executes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct KernelParameters {
    pub size: InputSize,
    pub n_global_butterflies: usize,
    pub log2_n_global_butterflies: u32,
    /// Butterflies executed by a single thread (`M`).
    pub butterflies_per_thread: usize,
    /// Base twiddle angle, `-pi / n_global_butterflies`.
    pub minus_pi_over_n: f32,
}

impl KernelParameters {
    /// # Panics
    ///
    /// Panics if `butterflies_per_thread` is zero or does not divide `N / 2`.
    pub fn new(size: InputSize, butterflies_per_thread: usize) -> Self {
        let n_global_butterflies = size.n_global_butterflies();
        assert!(butterflies_per_thread > 0);
        assert_eq!(n_global_butterflies % butterflies_per_thread, 0);

        Self {
            size,
            n_global_butterflies,
            log2_n_global_butterflies: n_global_butterflies.ilog2(),
            butterflies_per_thread,
            minus_pi_over_n: minus_pi_over(n_global_butterflies),
        }
    }

    /// Number of threads in the single workgroup the kernel runs as.
    #[inline]
    pub fn threads(&self) -> usize {
        self.n_global_butterflies / self.butterflies_per_thread
    }

    /// Twiddle factor `t` as `(cos, sin)` of `t * minus_pi_over_n`.
    #[inline]
    pub fn twiddle(&self, t: usize) -> (f32, f32) {
        let (s, c) = (self.minus_pi_over_n * t as f32).sin_cos();
        (c, s)
    }
}

/// `-pi / n` in single precision.
pub fn minus_pi_over(n: usize) -> f32 {
    -PI / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_sizes() {
        for n in [0, 1, 3, 6, 12, 1000] {
            assert!(matches!(InputSize::new(n), Err(Error::InvalidSize(m)) if m == n));
        }
        for k in 1..30 {
            assert_eq!(InputSize::new(1 << k).unwrap().get(), 1 << k);
        }
    }

    #[test]
    fn parameters_for_eight_points() {
        let params = KernelParameters::new(InputSize::new(8).unwrap(), 1);
        assert_eq!(params.n_global_butterflies, 4);
        assert_eq!(params.log2_n_global_butterflies, 2);
        assert_eq!(params.threads(), 4);
        assert_eq!(params.minus_pi_over_n, (-std::f64::consts::PI / 4.0) as f32);
    }

    #[test]
    fn two_points_have_a_single_butterfly() {
        let params = KernelParameters::new(InputSize::new(2).unwrap(), 1);
        assert_eq!(params.n_global_butterflies, 1);
        assert_eq!(params.log2_n_global_butterflies, 0);
        assert_eq!(params.minus_pi_over_n, -PI);
    }

    #[test]
    fn local_memory_is_twice_the_output() {
        let size = InputSize::new(1024).unwrap();
        assert_eq!(size.output_bytes(), 1024 * 8);
        assert_eq!(size.local_mem_required(), 2 * 1024 * 8);
    }

    #[test]
    #[should_panic]
    fn multiplicity_must_divide_butterflies() {
        KernelParameters::new(InputSize::new(16).unwrap(), 3);
    }
}
