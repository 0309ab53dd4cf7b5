//! Moves one input vector into device images.

use tracing::debug;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::params::InputSize;

/// Fails with [`Error::InsufficientLocalMemory`] when the device cannot hold the
/// kernel's scratch space for `size`.
pub fn check_local_memory<D: Device>(device: &D, size: InputSize) -> Result<()> {
    let available = device.local_mem_size()?;
    let required = size.local_mem_required();
    if available < required {
        return Err(Error::InsufficientLocalMemory {
            required,
            available,
        });
    }
    Ok(())
}

/// Allocates the image pair for `input` and uploads it.
///
/// The returned images release their device memory when dropped.
pub fn stage<D: Device>(device: &mut D, input: &[f32]) -> Result<D::Images> {
    let size = InputSize::new(input.len())?;
    check_local_memory(device, size)?;

    let mut images = device.allocate_images(size)?;
    device.write_input(&mut images, input)?;
    debug!(size = size.get(), "staged input");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimulatedDevice;

    #[test]
    fn rejects_sizes_beyond_local_memory() {
        let device = SimulatedDevice::new(32 * 1024, 256);
        assert!(check_local_memory(&device, InputSize::new(2048).unwrap()).is_ok());
        let err = check_local_memory(&device, InputSize::new(4096).unwrap()).unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert!(matches!(
            err,
            Error::InsufficientLocalMemory {
                required: 65536,
                available: 32768
            }
        ));
    }

    #[test]
    fn invalid_length_is_rejected_before_allocation() {
        let mut device = SimulatedDevice::default();
        for len in [0, 1, 3, 12] {
            let input = vec![0.0; len];
            assert!(matches!(stage(&mut device, &input), Err(Error::InvalidSize(n)) if n == len));
        }
    }

    #[test]
    fn stages_and_reads_back() {
        let mut device = SimulatedDevice::default();
        let input: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let images = stage(&mut device, &input).unwrap();
        let output = device.read_output(&images).unwrap();
        assert_eq!(output.len(), 8);
    }
}
