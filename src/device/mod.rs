//! Compute devices the benchmark can run on.
//!
//! A [`Device`] compiles specialized kernels, owns the image pair of a run,
//! launches the kernel and reports its timestamps. Compiled kernels and images
//! are plain owned values: dropping them releases the device resources, so a
//! failure anywhere in a run still cleans up after itself.
//!
//! - [`simulated::SimulatedDevice`] replays the kernel on the host. It needs
//!   nothing installed and is what the tests run against.
//! - `opencl::OpenClDevice` (feature `opencl`) runs the real kernel.
use num_complex::Complex32;

use crate::bencher::TimingSample;
use crate::error::Result;
use crate::options::CompilerOptions;
use crate::params::{InputSize, KernelParameters};

#[cfg(feature = "opencl")]
pub mod opencl;
pub mod simulated;

/// Launch geometry of one kernel dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub global_size: usize,
    pub local_size: usize,
    /// Size of the local scratch argument, in bytes.
    pub local_mem_bytes: u64,
}

impl Geometry {
    /// The whole network as exactly one workgroup.
    pub fn single_workgroup(params: &KernelParameters) -> Self {
        let threads = params.threads();
        Self {
            global_size: threads,
            local_size: threads,
            local_mem_bytes: params.size.local_mem_required(),
        }
    }
}

pub trait Device {
    /// A compiled program together with its entry point.
    type Kernel;
    /// The read-only input image and write-only output image of one run.
    type Images;

    fn name(&self) -> &str;

    /// Capacity of the on-chip memory shared by a workgroup, in bytes.
    fn local_mem_size(&self) -> Result<u64>;

    /// Builds `source`, which was rendered from `params`.
    fn compile(
        &mut self,
        params: &KernelParameters,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<Self::Kernel>;

    /// Largest workgroup `kernel` can be launched with on this device.
    fn max_workgroup_size(&self, kernel: &Self::Kernel) -> Result<usize>;

    /// Allocates the images for an input of `size` samples.
    fn allocate_images(&mut self, size: InputSize) -> Result<Self::Images>;

    /// Copies `input` into the input image, returning once the copy is done.
    fn write_input(&mut self, images: &mut Self::Images, input: &[f32]) -> Result<()>;

    /// Launches `kernel` once and blocks until the device reports completion.
    fn launch(
        &mut self,
        kernel: &Self::Kernel,
        images: &mut Self::Images,
        geometry: Geometry,
    ) -> Result<TimingSample>;

    /// Reads the output image back, blocking until the transfer completes.
    fn read_output(&mut self, images: &Self::Images) -> Result<Vec<Complex32>>;
}
