//! Knobs for a benchmark sweep.
//!
//! Every struct here has a `Default` that reproduces the reference setup: all
//! compiler optimizations on, 5 warm-up launches followed by 3000 timed ones,
//! verification on, and a sweep from 8 points up to (but excluding) 10 million.
//!
//! You only need to change these when exploring how a particular device reacts
//! to a different precision/speed tradeoff or sweep range.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Options passed to the device compiler.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// `-cl-denorms-are-zero`
    pub denormals_are_zero: bool,
    /// `-cl-strict-aliasing`
    pub strict_aliasing: bool,
    /// `-cl-fast-relaxed-math`
    ///
    /// Makes the twiddle factor computation a little faster, but a little less
    /// accurate too. This is a known source of extra error in the output.
    pub fast_relaxed_math: bool,
    /// Extra `-I` include directories.
    pub include_paths: Vec<PathBuf>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            denormals_are_zero: true,
            strict_aliasing: true,
            fast_relaxed_math: true,
            include_paths: Vec::new(),
        }
    }
}

impl CompilerOptions {
    /// Builds the option string handed to the device compiler.
    pub fn to_flags(&self) -> String {
        let mut flags: Vec<String> = self
            .include_paths
            .iter()
            .map(|path| format!("-I {}", path.display()))
            .collect();
        if self.denormals_are_zero {
            flags.push("-cl-denorms-are-zero".to_string());
        }
        if self.strict_aliasing {
            flags.push("-cl-strict-aliasing".to_string());
        }
        if self.fast_relaxed_math {
            flags.push("-cl-fast-relaxed-math".to_string());
        }
        flags.join(" ")
    }
}

/// How many kernel launches to time.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BenchOptions {
    /// Launches whose timings are discarded.
    pub warmup: usize,
    /// Launches that contribute to the average.
    pub trials: usize,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            warmup: 5,
            trials: 3000,
        }
    }
}

impl BenchOptions {
    pub fn new(warmup: usize, trials: usize) -> Self {
        Self { warmup, trials }
    }

    #[inline]
    pub fn total_launches(&self) -> usize {
        self.warmup + self.trials
    }

    /// Rejects options that leave nothing to average.
    pub fn validate(&self) -> Result<(), Error> {
        if self.trials == 0 {
            return Err(Error::InvalidOptions(
                "at least one timed launch is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Range of sizes to sweep and what to do at each one.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    /// First input size. Must be a power of two, at least 2.
    pub min_size: usize,
    /// Sizes are doubled while they stay strictly below this bound.
    pub max_size: usize,
    /// Seed of the pseudo-random input signal.
    pub seed: u64,
    /// Compare every device output against the reference transform.
    pub verify: bool,
    pub bench: BenchOptions,
    pub compiler: CompilerOptions,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            min_size: 8,
            max_size: 10_000_000,
            seed: 0,
            verify: true,
            bench: BenchOptions::default(),
            compiler: CompilerOptions::default(),
        }
    }
}

impl SweepOptions {
    /// The sizes this sweep visits, in order, assuming no early stop.
    pub fn sizes(&self) -> impl Iterator<Item = usize> {
        let max_size = self.max_size;
        std::iter::successors(Some(self.min_size), |&n| n.checked_mul(2))
            .take_while(move |&n| n < max_size)
    }
}

/// Which compute device to benchmark on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The first device of the first platform.
    #[default]
    FirstAvailable,
    /// The first GPU, falling back to the first device of any type.
    FirstGpu,
    /// A device by its index in the enumeration of all devices.
    Index(usize),
}

impl FromStr for DeviceSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first" => Ok(DeviceSelector::FirstAvailable),
            "gpu" => Ok(DeviceSelector::FirstGpu),
            other => other
                .parse()
                .map(DeviceSelector::Index)
                .map_err(|_| format!("expected `first`, `gpu` or a device index, got `{other}`")),
        }
    }
}
