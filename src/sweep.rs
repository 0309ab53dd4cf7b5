//! Benchmarks the kernel over increasing power-of-two input sizes.
//!
//! A size that needs more local memory than the device has ends the sweep: the
//! sizes measured so far are returned as a success, since every larger size
//! would fail the same way. Any other failure, including a wrong result, is
//! returned as an error.
use tracing::{info, warn};
use utilities::{gen_random_input, reference_fft};

use crate::bencher::{run_benchmark, BenchmarkResult};
use crate::device::{Device, Geometry};
use crate::error::Result;
use crate::options::{CompilerOptions, SweepOptions};
use crate::params::{InputSize, KernelParameters};
use crate::planner::{plan_dispatch, DispatchPlan, WorkgroupProbe};
use crate::staging::{check_local_memory, stage};
use crate::template::KernelTemplate;
use crate::verify::{check_network_consistency, verify_output, DEVICE_TOLERANCE};

/// Outcome of one input size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeReport {
    pub size: usize,
    pub plan: DispatchPlan,
    pub benchmark: BenchmarkResult,
    /// Whether the output was compared against the reference (it matched).
    pub verified: bool,
}

impl SizeReport {
    pub fn workgroup_size(&self) -> usize {
        self.plan.workgroup_size()
    }

    pub fn butterflies_per_thread(&self) -> usize {
        self.plan.params.butterflies_per_thread
    }

    pub fn average_us(&self) -> u64 {
        self.benchmark.average_us
    }
}

/// Compiles candidate kernels on a device only to read their workgroup limit.
struct DeviceProbe<'a, D> {
    device: &'a mut D,
    template: &'a KernelTemplate,
    compiler: &'a CompilerOptions,
}

impl<D: Device> WorkgroupProbe for DeviceProbe<'_, D> {
    fn max_workgroup_size(&mut self, params: &KernelParameters) -> Result<usize> {
        let source = self.template.render(params)?;
        let kernel = self.device.compile(params, &source, self.compiler)?;
        self.device.max_workgroup_size(&kernel)
    }
}

/// Plans, compiles, stages, times and optionally verifies one input.
pub fn run_size<D: Device>(
    device: &mut D,
    template: &KernelTemplate,
    options: &SweepOptions,
    input: &[f32],
) -> Result<SizeReport> {
    let size = InputSize::new(input.len())?;
    check_local_memory(device, size)?;

    if options.verify {
        check_network_consistency(input)?;
    }

    let plan = plan_dispatch(
        size,
        &mut DeviceProbe {
            device: &mut *device,
            template,
            compiler: &options.compiler,
        },
    )?;

    let source = template.render(&plan.params)?;
    let kernel = device.compile(&plan.params, &source, &options.compiler)?;
    let mut images = stage(device, input)?;

    let geometry = Geometry::single_workgroup(&plan.params);
    let benchmark = run_benchmark(device, &kernel, &mut images, geometry, options.bench)?;
    let output = device.read_output(&images)?;

    if options.verify {
        verify_output(&output, &reference_fft(input), DEVICE_TOLERANCE)?;
        info!(size = size.get(), "verified results");
    }

    Ok(SizeReport {
        size: size.get(),
        plan,
        benchmark,
        verified: options.verify,
    })
}

/// Runs every size of `options` in order until done or out of local memory.
pub fn run_sweep<D: Device>(
    device: &mut D,
    template: &KernelTemplate,
    options: &SweepOptions,
) -> Result<Vec<SizeReport>> {
    let mut reports = Vec::new();
    run_sweep_with(device, template, options, |report| reports.push(report.clone()))?;
    Ok(reports)
}

/// Like [`run_sweep`], but hands each report to `on_report` as soon as its size
/// completes, so results already measured survive a later fatal error.
///
/// Returns the number of sizes that completed.
pub fn run_sweep_with<D, F>(
    device: &mut D,
    template: &KernelTemplate,
    options: &SweepOptions,
    mut on_report: F,
) -> Result<usize>
where
    D: Device,
    F: FnMut(&SizeReport),
{
    options.bench.validate()?;
    let mut completed = 0;

    for n in options.sizes() {
        info!(input_size = n, device = device.name(), "starting size");
        let input = gen_random_input(n, options.seed);

        match run_size(device, template, options, &input) {
            Ok(report) => {
                on_report(&report);
                completed += 1;
            }
            Err(err) if err.is_resource_exhaustion() => {
                warn!(input_size = n, "{err}, stopping the sweep");
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimulatedDevice;
    use crate::error::Error;
    use crate::options::BenchOptions;

    fn quick_options() -> SweepOptions {
        SweepOptions {
            bench: BenchOptions::new(1, 3),
            ..SweepOptions::default()
        }
    }

    #[test]
    fn sweep_stops_at_the_local_memory_ceiling() {
        let mut device = SimulatedDevice::new(32 * 1024, 256);
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &quick_options()).unwrap();

        let sizes: Vec<usize> = reports.iter().map(|r| r.size).collect();
        assert_eq!(sizes, vec![8, 16, 32, 64, 128, 256, 512, 1024, 2048]);
        assert!(reports.iter().all(|r| r.verified));
        assert!(reports.iter().all(|r| r.benchmark.trials == 3));
    }

    #[test]
    fn large_sizes_use_several_butterflies_per_thread() {
        let mut device = SimulatedDevice::new(1 << 20, 64);
        let options = SweepOptions {
            max_size: 1 << 13,
            ..quick_options()
        };
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap();

        let last = reports.last().unwrap();
        assert_eq!(last.size, 4096);
        assert_eq!(last.butterflies_per_thread(), 32);
        assert_eq!(last.workgroup_size(), 64);
        assert_eq!(last.plan.attempts, 2);
        for report in &reports {
            assert!(report.workgroup_size() <= 64);
            assert_eq!(report.benchmark.geometry.global_size, report.workgroup_size());
            assert_eq!(report.benchmark.geometry.local_size, report.workgroup_size());
        }
    }

    #[test]
    fn probes_plus_final_compile() {
        let mut device = SimulatedDevice::new(1 << 20, 4);
        let options = SweepOptions {
            min_size: 64,
            max_size: 65,
            ..quick_options()
        };
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap();
        assert_eq!(reports.len(), 1);
        // one probe with M = 1, one with M = 8, then the accepted kernel
        assert_eq!(reports[0].butterflies_per_thread(), 8);
        assert_eq!(device.compilations(), 3);
    }

    #[test]
    fn shrinking_limit_is_refined() {
        let mut device = SimulatedDevice::new(1 << 20, 0)
            .with_workgroup_limit(|m| if m == 1 { 256 } else { 128 });
        let input = gen_random_input(4096, 0);
        let report =
            run_size(&mut device, &KernelTemplate::default(), &quick_options(), &input).unwrap();
        // 2048 / 256 = 8 first, then 8 * 128 threads are still too few
        assert_eq!(report.butterflies_per_thread(), 16);
        assert_eq!(report.plan.attempts, 3);
        assert!(report.verified);
    }

    #[test]
    fn verification_can_be_skipped() {
        let mut device = SimulatedDevice::default();
        let options = SweepOptions {
            verify: false,
            max_size: 64,
            ..quick_options()
        };
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| !r.verified));
    }

    #[test]
    fn invalid_size_is_fatal() {
        let mut device = SimulatedDevice::default();
        let err = run_size(&mut device, &KernelTemplate::default(), &quick_options(), &[0.0; 12])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSize(12)));
        assert_eq!(device.compilations(), 0);
    }

    #[test]
    fn compile_errors_are_fatal() {
        // every placeholder present, but no entry point
        let template = KernelTemplate::new(
            "#define A replace_MINUS_PI_over_N_GLOBAL_BUTTERFLIES\n\
             #define B replace_LOG2_N_GLOBAL_BUTTERFLIES\n\
             #define C replace_N_GLOBAL_BUTTERFLIES\n\
             #define D replace_N_LOCAL_BUTTERFLIES\n",
        )
        .unwrap();
        let mut device = SimulatedDevice::default();
        let err = run_sweep(&mut device, &template, &quick_options()).unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }

    #[test]
    fn completed_sizes_are_reported_before_a_fatal_error() {
        // size 8 fits in 4 threads, size 16 finds no workgroup at all
        let mut device = SimulatedDevice::new(1 << 20, 0)
            .with_workgroup_limit(|m| if m == 1 { 4 } else { 0 });
        let mut delivered = Vec::new();
        let err = run_sweep_with(&mut device, &KernelTemplate::default(), &quick_options(), |r| {
            delivered.push(r.size)
        })
        .unwrap_err();

        assert!(matches!(err, Error::Planning(_)));
        assert_eq!(delivered, vec![8]);
        assert_eq!(device.live_kernels(), 0);
        assert_eq!(device.live_images(), 0);
    }

    #[test]
    fn reports_arrive_in_size_order() {
        let mut device = SimulatedDevice::default();
        let options = SweepOptions {
            max_size: 128,
            ..quick_options()
        };
        let mut delivered = Vec::new();
        let completed = run_sweep_with(&mut device, &KernelTemplate::default(), &options, |r| {
            delivered.push(r.size)
        })
        .unwrap();
        assert_eq!(completed, 4);
        assert_eq!(delivered, vec![8, 16, 32, 64]);
    }

    #[test]
    fn wrong_output_is_fatal() {
        let mut device = SimulatedDevice::default().with_corrupted_output(5);
        let err = run_sweep(&mut device, &KernelTemplate::default(), &quick_options()).unwrap_err();
        match err {
            Error::Verification(mismatch) => assert_eq!(mismatch.index, 5),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(device.launches(), 4);
        assert_eq!(device.live_kernels(), 0);
        assert_eq!(device.live_images(), 0);
    }

    #[test]
    fn unverified_run_ignores_wrong_output() {
        let mut device = SimulatedDevice::default().with_corrupted_output(5);
        let options = SweepOptions {
            verify: false,
            max_size: 32,
            ..quick_options()
        };
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn resources_are_released_after_a_successful_sweep() {
        let mut device = SimulatedDevice::default();
        let options = SweepOptions {
            max_size: 1 << 13,
            ..quick_options()
        };
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap();
        assert!(!reports.is_empty());
        assert!(device.compilations() > reports.len());
        assert_eq!(device.live_kernels(), 0);
        assert_eq!(device.live_images(), 0);
    }

    #[test]
    fn zero_trials_are_rejected_up_front() {
        let mut device = SimulatedDevice::default();
        let options = SweepOptions {
            bench: BenchOptions::new(5, 0),
            ..SweepOptions::default()
        };
        let err = run_sweep(&mut device, &KernelTemplate::default(), &options).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
        assert_eq!(device.compilations(), 0);
    }

    #[test]
    fn first_size_too_large_gives_an_empty_sweep() {
        let mut device = SimulatedDevice::new(64, 256);
        let reports = run_sweep(&mut device, &KernelTemplate::default(), &quick_options()).unwrap();
        assert!(reports.is_empty());
        assert_eq!(device.compilations(), 0);
    }
}
