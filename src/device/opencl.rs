//! OpenCL backend.
//!
//! Only available when compiled with the `opencl` feature:
//! ```bash
//! cargo build --features opencl
//! ```
//!
//! The command queue is created with profiling enabled, so every launch returns
//! the device's own start/end timestamps instead of host-measured time.
use std::ffi::c_void;
use std::ptr;

use num_complex::Complex32;
use opencl3::command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{get_all_devices, Device as ClDevice, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{
    Image, CL_FLOAT, CL_MEM_OBJECT_IMAGE1D, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY, CL_RGBA,
};
use opencl3::program::Program;
use opencl3::types::{cl_image_desc, cl_image_format, cl_mem_flags, CL_BLOCKING};
use tracing::{debug, info};

use super::{Device, Geometry};
use crate::bencher::TimingSample;
use crate::error::{Error, Result};
use crate::options::{CompilerOptions, DeviceSelector};
use crate::params::{InputSize, KernelParameters};
use crate::template::ENTRY_POINT;

/// Floats per RGBA pixel.
const CHANNELS: usize = 4;

pub struct OpenClDevice {
    device: ClDevice,
    context: Context,
    queue: CommandQueue,
    name: String,
}

impl std::fmt::Debug for OpenClDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClDevice")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Compiled program and its entry point.
///
/// Fields drop in order, so the kernel is released before its program.
pub struct OpenClKernel {
    kernel: Kernel,
    _program: Program,
}

pub struct OpenClImages {
    size: InputSize,
    input: Image,
    output: Image,
}

impl OpenClDevice {
    /// Opens the device picked by `selector`, with a profiling command queue.
    pub fn new(selector: DeviceSelector) -> Result<Self> {
        let all_ids = get_all_devices(CL_DEVICE_TYPE_ALL)?;

        let selected_id = match selector {
            DeviceSelector::FirstAvailable => all_ids.first().copied(),
            DeviceSelector::FirstGpu => get_all_devices(CL_DEVICE_TYPE_GPU)?
                .first()
                .copied()
                .or_else(|| all_ids.first().copied()),
            DeviceSelector::Index(index) => all_ids.get(index).copied(),
        }
        .ok_or_else(|| Error::Device(format!("no OpenCL device matches {selector:?}")))?;

        let device = ClDevice::new(selected_id);
        let name = device.name()?.trim().to_string();
        let context = Context::from_device(&device)?;

        // OpenCL 1.2 API, the 2.0 one is missing on macOS
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE)?;

        info!(device = %name, "opened OpenCL device");
        Ok(Self {
            device,
            context,
            queue,
            name,
        })
    }

    fn create_image(&self, flags: cl_mem_flags, width: usize) -> Result<Image> {
        let format = cl_image_format {
            image_channel_order: CL_RGBA,
            image_channel_data_type: CL_FLOAT,
        };
        let desc = cl_image_desc {
            image_type: CL_MEM_OBJECT_IMAGE1D,
            image_width: width,
            image_height: 1,
            image_depth: 1,
            image_array_size: 1,
            image_row_pitch: 0,
            image_slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
            buffer: ptr::null_mut(),
        };
        let image =
            unsafe { Image::create(&self.context, flags, &format, &desc, ptr::null_mut())? };
        Ok(image)
    }
}

impl Device for OpenClDevice {
    type Kernel = OpenClKernel;
    type Images = OpenClImages;

    fn name(&self) -> &str {
        &self.name
    }

    fn local_mem_size(&self) -> Result<u64> {
        Ok(self.device.local_mem_size()?)
    }

    fn compile(
        &mut self,
        params: &KernelParameters,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<OpenClKernel> {
        let flags = options.to_flags();
        debug!(
            butterflies_per_thread = params.butterflies_per_thread,
            flags = %flags,
            "building kernel"
        );
        let program = Program::create_and_build_from_source(&self.context, source, &flags)
            .map_err(|log| Error::Compile { log })?;
        let kernel = Kernel::create(&program, ENTRY_POINT)?;
        Ok(OpenClKernel {
            kernel,
            _program: program,
        })
    }

    fn max_workgroup_size(&self, kernel: &OpenClKernel) -> Result<usize> {
        Ok(kernel.kernel.get_work_group_size(self.device.id())?)
    }

    fn allocate_images(&mut self, size: InputSize) -> Result<OpenClImages> {
        let n = size.get();
        let input = self.create_image(CL_MEM_READ_ONLY, n)?;
        let output = self.create_image(CL_MEM_WRITE_ONLY, 2 * n)?;
        Ok(OpenClImages {
            size,
            input,
            output,
        })
    }

    fn write_input(&mut self, images: &mut OpenClImages, input: &[f32]) -> Result<()> {
        if input.len() != images.size.get() {
            return Err(Error::Device(format!(
                "cannot write {} samples into an image sized for {}",
                input.len(),
                images.size.get()
            )));
        }
        // whole pixels only; pad the last one when fewer than 4 samples remain
        let pixels = input.len().div_ceil(CHANNELS);
        let mut padded = input.to_vec();
        padded.resize(pixels * CHANNELS, 0.0);

        let origin = [0usize; 3];
        let region = [pixels, 1, 1];
        unsafe {
            self.queue.enqueue_write_image(
                &mut images.input,
                CL_BLOCKING,
                origin.as_ptr(),
                region.as_ptr(),
                0,
                0,
                padded.as_mut_ptr() as *mut c_void,
                &[],
            )?;
        }
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: &OpenClKernel,
        images: &mut OpenClImages,
        geometry: Geometry,
    ) -> Result<TimingSample> {
        let event = unsafe {
            ExecuteKernel::new(&kernel.kernel)
                .set_arg(&images.input)
                .set_arg(&images.output)
                .set_arg_local_buffer(geometry.local_mem_bytes as usize)
                .set_global_work_size(geometry.global_size)
                .set_local_work_size(geometry.local_size)
                .enqueue_nd_range(&self.queue)?
        };
        event.wait()?;

        let start_ns = event.profiling_command_start()?;
        let end_ns = event.profiling_command_end()?;
        Ok(TimingSample { start_ns, end_ns })
    }

    fn read_output(&mut self, images: &OpenClImages) -> Result<Vec<Complex32>> {
        let n = images.size.get();
        let mut output = vec![Complex32::default(); n];

        // two complex samples per pixel
        let origin = [0usize; 3];
        let region = [n / 2, 1, 1];
        let samples: &mut [f32] = bytemuck::cast_slice_mut(&mut output);
        unsafe {
            self.queue.enqueue_read_image(
                &images.output,
                CL_BLOCKING,
                origin.as_ptr(),
                region.as_ptr(),
                0,
                0,
                samples.as_mut_ptr() as *mut c_void,
                &[],
            )?;
        }
        Ok(output)
    }
}
