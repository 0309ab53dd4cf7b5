//! Times repeated launches of a compiled kernel.

use tracing::info;

use crate::device::{Device, Geometry};
use crate::error::{Error, Result};
use crate::options::BenchOptions;

/// Device-reported start and end of one kernel launch, in nanoseconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TimingSample {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl TimingSample {
    #[inline]
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub geometry: Geometry,
    /// Launches that contributed to the average.
    pub trials: usize,
    pub average_ns: f64,
    /// Average duration in whole microseconds, truncated.
    pub average_us: u64,
}

/// Average duration of `samples` after dropping the first `warmup` ones.
///
/// Returns `(average_ns, average_us)`, where the microseconds are truncated the
/// same way twice: the nanosecond average is truncated first, then divided by
/// 1000. Returns `None` if no sample is left after the warm-up.
pub fn trimmed_mean(samples: &[TimingSample], warmup: usize) -> Option<(f64, u64)> {
    let timed = samples.get(warmup..).filter(|timed| !timed.is_empty())?;
    let total_ns: u128 = timed.iter().map(|s| u128::from(s.duration_ns())).sum();
    let count = timed.len() as u128;

    let average_ns = total_ns as f64 / count as f64;
    let average_us = (total_ns / count / 1000) as u64;
    Some((average_ns, average_us))
}

/// Launches `kernel` `warmup + trials` times, one after the other.
///
/// Each launch completes before the next one is issued, so timings never
/// overlap.
pub fn run_benchmark<D: Device>(
    device: &mut D,
    kernel: &D::Kernel,
    images: &mut D::Images,
    geometry: Geometry,
    options: BenchOptions,
) -> Result<BenchmarkResult> {
    options.validate()?;
    info!(global_size = geometry.global_size, "running kernels");

    let samples = (0..options.total_launches())
        .map(|_| device.launch(kernel, images, geometry))
        .collect::<Result<Vec<_>>>()?;

    let (average_ns, average_us) = trimmed_mean(&samples, options.warmup).ok_or_else(|| {
        Error::InvalidOptions("benchmark needs at least one timed launch".to_string())
    })?;

    info!(average_us, "avg kernel duration");
    Ok(BenchmarkResult {
        geometry,
        trials: options.trials,
        average_ns,
        average_us,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimulatedDevice;
    use crate::options::CompilerOptions;
    use crate::params::{InputSize, KernelParameters};
    use crate::template::KernelTemplate;

    fn sample(start_ns: u64, duration_ns: u64) -> TimingSample {
        TimingSample {
            start_ns,
            end_ns: start_ns + duration_ns,
        }
    }

    #[test]
    fn warmup_samples_are_ignored() {
        let mut samples: Vec<TimingSample> = (0..5).map(|i| sample(i, 1_000_000_000)).collect();
        samples.extend((0..3000).map(|i| sample(10_000 * i, 2_500)));
        assert_eq!(samples.len(), 3005);

        let (average_ns, average_us) = trimmed_mean(&samples, 5).unwrap();
        assert_eq!(average_ns, 2_500.0);
        assert_eq!(average_us, 2);
    }

    #[test]
    fn only_the_last_samples_count() {
        let mut samples = vec![sample(0, 7); 3005];
        for s in samples.iter_mut().take(5) {
            s.end_ns = u64::MAX / 4;
        }
        samples[5] = sample(0, 3_007_000 * 3000 - 7 * 2999);
        let (average_ns, average_us) = trimmed_mean(&samples, 5).unwrap();
        assert_eq!(average_ns, 3_007_000.0);
        assert_eq!(average_us, 3_007);
    }

    #[test]
    fn microseconds_are_truncated() {
        let samples = [sample(0, 1_999), sample(0, 1_999)];
        assert_eq!(trimmed_mean(&samples, 0), Some((1_999.0, 1)));
    }

    #[test]
    fn nothing_left_after_warmup() {
        let samples = [sample(0, 1); 5];
        assert_eq!(trimmed_mean(&samples, 5), None);
        assert_eq!(trimmed_mean(&samples, 10), None);
    }

    #[test]
    fn runs_the_requested_number_of_launches() {
        let mut device = SimulatedDevice::default();
        let size = InputSize::new(16).unwrap();
        let params = KernelParameters::new(size, 1);
        let source = KernelTemplate::default().render(&params).unwrap();
        let kernel = device
            .compile(&params, &source, &CompilerOptions::default())
            .unwrap();
        let mut images = device.allocate_images(size).unwrap();
        device.write_input(&mut images, &[0.5; 16]).unwrap();

        let geometry = Geometry::single_workgroup(&params);
        let result = run_benchmark(
            &mut device,
            &kernel,
            &mut images,
            geometry,
            BenchOptions::new(2, 10),
        )
        .unwrap();
        assert_eq!(result.trials, 10);
        assert_eq!(result.geometry, geometry);
        assert_eq!(result.geometry.global_size, 8);
        assert_eq!(result.geometry.local_size, 8);
    }

    #[test]
    fn zero_trials_fail_before_any_launch() {
        let mut device = SimulatedDevice::default();
        let size = InputSize::new(16).unwrap();
        let params = KernelParameters::new(size, 1);
        let source = KernelTemplate::default().render(&params).unwrap();
        let kernel = device
            .compile(&params, &source, &CompilerOptions::default())
            .unwrap();
        let mut images = device.allocate_images(size).unwrap();

        let err = run_benchmark(
            &mut device,
            &kernel,
            &mut images,
            Geometry::single_workgroup(&params),
            BenchOptions::new(5, 0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
        assert_eq!(device.launches(), 0);
    }
}
