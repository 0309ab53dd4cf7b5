//! A host-side stand-in for a compute device.
//!
//! Images are kept with the same RGBA pixel layout the real device uses, the
//! kernel is replayed by [`simulate_kernel`], and launch geometries are checked
//! the way an OpenCL runtime checks them. Timestamps come from the host clock.
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use num_complex::Complex32;

use super::{Device, Geometry};
use crate::bencher::TimingSample;
use crate::butterfly::simulate_kernel;
use crate::error::{Error, Result};
use crate::options::CompilerOptions;
use crate::params::{InputSize, KernelParameters};
use crate::template::ENTRY_POINT;

type Pixel = [f32; 4];

/// Maximum workgroup size as a function of the butterflies each thread runs.
pub type WorkgroupLimit = Box<dyn Fn(usize) -> usize>;

pub struct SimulatedDevice {
    name: String,
    local_mem_size: u64,
    workgroup_limit: WorkgroupLimit,
    clock: Instant,
    compilations: usize,
    launches: usize,
    corrupted_output: Option<usize>,
    live_kernels: Rc<Cell<usize>>,
    live_images: Rc<Cell<usize>>,
}

/// Counts one live resource until dropped.
#[derive(Debug)]
struct LiveGuard(Rc<Cell<usize>>);

impl LiveGuard {
    fn acquire(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(Rc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("name", &self.name)
            .field("local_mem_size", &self.local_mem_size)
            .field("compilations", &self.compilations)
            .field("launches", &self.launches)
            .field("corrupted_output", &self.corrupted_output)
            .finish_non_exhaustive()
    }
}

impl Default for SimulatedDevice {
    /// 32 KiB of local memory and workgroups of up to 256 threads.
    fn default() -> Self {
        Self::new(32 * 1024, 256)
    }
}

impl SimulatedDevice {
    pub fn new(local_mem_size: u64, max_workgroup_size: usize) -> Self {
        Self {
            name: "simulated".to_string(),
            local_mem_size,
            workgroup_limit: Box::new(move |_| max_workgroup_size),
            clock: Instant::now(),
            compilations: 0,
            launches: 0,
            corrupted_output: None,
            live_kernels: Rc::new(Cell::new(0)),
            live_images: Rc::new(Cell::new(0)),
        }
    }

    /// Replaces the workgroup limit by one that depends on the multiplicity.
    pub fn with_workgroup_limit(mut self, limit: impl Fn(usize) -> usize + 'static) -> Self {
        self.workgroup_limit = Box::new(limit);
        self
    }

    /// Makes every launch add 1 to the real part of output element `index`,
    /// for inputs long enough to have it.
    pub fn with_corrupted_output(mut self, index: usize) -> Self {
        self.corrupted_output = Some(index);
        self
    }

    /// How many kernels were compiled so far.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    /// How many kernel launches were issued so far.
    pub fn launches(&self) -> usize {
        self.launches
    }

    /// Compiled kernels not yet dropped.
    pub fn live_kernels(&self) -> usize {
        self.live_kernels.get()
    }

    /// Image pairs not yet dropped.
    pub fn live_images(&self) -> usize {
        self.live_images.get()
    }
}

#[derive(Debug)]
pub struct SimulatedKernel {
    params: KernelParameters,
    _live: LiveGuard,
}

#[derive(Debug)]
pub struct SimulatedImages {
    size: InputSize,
    input: Vec<Pixel>,
    output: Vec<Pixel>,
    _live: LiveGuard,
}

impl Device for SimulatedDevice {
    type Kernel = SimulatedKernel;
    type Images = SimulatedImages;

    fn name(&self) -> &str {
        &self.name
    }

    fn local_mem_size(&self) -> Result<u64> {
        Ok(self.local_mem_size)
    }

    fn compile(
        &mut self,
        params: &KernelParameters,
        source: &str,
        _options: &CompilerOptions,
    ) -> Result<SimulatedKernel> {
        if source.contains("replace_") {
            return Err(Error::Compile {
                log: "error: use of undeclared identifier starting with 'replace_'".to_string(),
            });
        }
        if !source.contains(ENTRY_POINT) {
            return Err(Error::Compile {
                log: format!("error: no kernel named '{ENTRY_POINT}'"),
            });
        }
        self.compilations += 1;
        Ok(SimulatedKernel {
            params: *params,
            _live: LiveGuard::acquire(&self.live_kernels),
        })
    }

    fn max_workgroup_size(&self, kernel: &SimulatedKernel) -> Result<usize> {
        Ok((self.workgroup_limit)(kernel.params.butterflies_per_thread))
    }

    fn allocate_images(&mut self, size: InputSize) -> Result<SimulatedImages> {
        let n = size.get();
        Ok(SimulatedImages {
            size,
            input: vec![[0.0; 4]; n],
            output: vec![[0.0; 4]; 2 * n],
            _live: LiveGuard::acquire(&self.live_images),
        })
    }

    fn write_input(&mut self, images: &mut SimulatedImages, input: &[f32]) -> Result<()> {
        if input.len() != images.size.get() {
            return Err(Error::Device(format!(
                "cannot write {} samples into an image sized for {}",
                input.len(),
                images.size.get()
            )));
        }
        let samples: &mut [f32] = bytemuck::cast_slice_mut(&mut images.input);
        samples[..input.len()].copy_from_slice(input);
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: &SimulatedKernel,
        images: &mut SimulatedImages,
        geometry: Geometry,
    ) -> Result<TimingSample> {
        let params = &kernel.params;
        if params.size != images.size {
            return Err(Error::Device(
                "kernel and images were prepared for different sizes".to_string(),
            ));
        }
        let limit = self.max_workgroup_size(kernel)?;
        if geometry.global_size != geometry.local_size
            || geometry.local_size > limit
            || geometry.global_size != params.threads()
        {
            return Err(Error::Device(format!(
                "invalid work group size {geometry:?} for {} threads (limit {limit})",
                params.threads()
            )));
        }
        if geometry.local_mem_bytes > self.local_mem_size {
            return Err(Error::Device(format!(
                "{} bytes of local memory requested, {} available",
                geometry.local_mem_bytes, self.local_mem_size
            )));
        }

        self.launches += 1;
        let start_ns = self.clock.elapsed().as_nanos() as u64;

        let n = images.size.get();
        let samples: &[f32] = bytemuck::cast_slice(&images.input);
        let result = simulate_kernel(params, &samples[..n]);
        let pixels: &mut [Complex32] = bytemuck::cast_slice_mut(&mut images.output);
        pixels[..n].copy_from_slice(&result);
        if let Some(z) = self.corrupted_output.and_then(|index| pixels[..n].get_mut(index)) {
            z.re += 1.0;
        }

        let end_ns = self.clock.elapsed().as_nanos() as u64;
        Ok(TimingSample { start_ns, end_ns })
    }

    fn read_output(&mut self, images: &SimulatedImages) -> Result<Vec<Complex32>> {
        let pixels: &[Complex32] = bytemuck::cast_slice(&images.output);
        Ok(pixels[..images.size.get()].to_vec())
    }
}
