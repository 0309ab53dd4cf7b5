use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use stockham_cl::device::simulated::SimulatedDevice;
use stockham_cl::device::Device;
use stockham_cl::options::{BenchOptions, DeviceSelector, SweepOptions};
use stockham_cl::sweep::{run_sweep_with, SizeReport};
use stockham_cl::template::KernelTemplate;
use stockham_cl::Result;

/// Times the image-based FFT kernel over doubling input sizes.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Device to run on: `first`, `gpu`, or an index into all devices.
    #[arg(long, default_value = "first")]
    device: DeviceSelector,

    /// Replay the kernel on the host instead of an OpenCL device.
    #[arg(long)]
    simulate: bool,

    /// Kernel template to use instead of the built-in one.
    #[arg(long)]
    kernel: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    min_size: usize,

    /// Sizes stay strictly below this bound.
    #[arg(long, default_value_t = 10_000_000)]
    max_size: usize,

    /// Seed of the random input signal.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Skip the comparison against the reference transform.
    #[arg(long)]
    no_verify: bool,

    #[arg(long, default_value_t = 5)]
    warmup: usize,

    #[arg(long, default_value_t = 3000)]
    trials: usize,

    #[arg(long)]
    no_denormals_are_zero: bool,

    #[arg(long)]
    no_strict_aliasing: bool,

    #[arg(long)]
    no_fast_math: bool,

    /// Extra include directory for the kernel compiler.
    #[arg(short = 'I', long = "include")]
    include_paths: Vec<PathBuf>,

    /// Local memory of the simulated device, in bytes.
    #[arg(long, default_value_t = 32 * 1024)]
    sim_local_mem: u64,

    /// Maximum workgroup size of the simulated device.
    #[arg(long, default_value_t = 256)]
    sim_workgroup: usize,
}

impl Args {
    fn sweep_options(&self) -> SweepOptions {
        let mut options = SweepOptions::default();
        options.min_size = self.min_size;
        options.max_size = self.max_size;
        options.seed = self.seed;
        options.verify = !self.no_verify;
        options.bench = BenchOptions::new(self.warmup, self.trials);
        options.compiler.denormals_are_zero = !self.no_denormals_are_zero;
        options.compiler.strict_aliasing = !self.no_strict_aliasing;
        options.compiler.fast_relaxed_math = !self.no_fast_math;
        options.compiler.include_paths = self.include_paths.clone();
        options
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

fn print_report(report: &SizeReport) {
    println!(
        "{:>9} points | {:>5} threads x {:>5} butterflies | {:>8} us{}",
        report.size,
        report.workgroup_size(),
        report.butterflies_per_thread(),
        report.average_us(),
        if report.verified { " | verified" } else { "" }
    );
}

fn sweep_on<D: Device>(
    device: &mut D,
    template: &KernelTemplate,
    options: &SweepOptions,
) -> Result<()> {
    let completed = run_sweep_with(device, template, options, print_report)?;
    if completed == 0 {
        warn!("no size could run on this device");
    }
    Ok(())
}

#[cfg(feature = "opencl")]
fn sweep_on_opencl(args: &Args, template: &KernelTemplate, options: &SweepOptions) -> Result<()> {
    let mut device = stockham_cl::device::opencl::OpenClDevice::new(args.device)?;
    sweep_on(&mut device, template, options)
}

#[cfg(not(feature = "opencl"))]
fn sweep_on_opencl(_: &Args, _: &KernelTemplate, _: &SweepOptions) -> Result<()> {
    Err(stockham_cl::Error::Device(
        "built without the `opencl` feature, rerun with --simulate".to_string(),
    ))
}

fn run(args: &Args) -> Result<()> {
    let template = match &args.kernel {
        Some(path) => KernelTemplate::from_file(path)?,
        None => KernelTemplate::default(),
    };
    let options = args.sweep_options();

    if args.simulate {
        let mut device = SimulatedDevice::new(args.sim_local_mem, args.sim_workgroup);
        sweep_on(&mut device, &template, &options)
    } else {
        sweep_on_opencl(args, &template, &options)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
