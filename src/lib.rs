//! Benchmark of a radix-2 FFT kernel that keeps its input and output in 1D
//! float images and runs the whole butterfly network inside one workgroup.
//!
//! For every power-of-two input size the sweep specializes the kernel source,
//! plans how many butterflies each thread runs, times thousands of launches
//! with device profiling, and checks the output against a reference transform.
//!
//! ```no_run
//! use stockham_cl::device::simulated::SimulatedDevice;
//! use stockham_cl::options::SweepOptions;
//! use stockham_cl::sweep::run_sweep;
//! use stockham_cl::template::KernelTemplate;
//!
//! let mut device = SimulatedDevice::default();
//! let reports = run_sweep(&mut device, &KernelTemplate::default(), &SweepOptions::default())?;
//! for report in &reports {
//!     println!("{:>8} points: {} us", report.size, report.average_us());
//! }
//! # Ok::<(), stockham_cl::Error>(())
//! ```
pub mod bencher;
pub mod butterfly;
pub mod device;
pub mod error;
pub mod options;
pub mod params;
pub mod planner;
pub mod staging;
pub mod sweep;
pub mod template;
pub mod verify;

pub use error::{Error, Result};
