//! Error type shared by every stage of a benchmark run.

use num_complex::Complex32;

use crate::template::TemplateError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// First output element that fell outside the verification tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub index: usize,
    pub actual: Complex32,
    pub expected: Complex32,
    pub tolerance: f32,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "element {} is {} but the reference is {} (tolerance {})",
            self.index, self.actual, self.expected, self.tolerance
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input length is not a power of two, or is smaller than 2.
    #[error("input size {0} must be a power of two and at least 2")]
    InvalidSize(usize),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The device compiler rejected the rendered kernel.
    #[error("kernel compilation failed:\n{log}")]
    Compile { log: String },

    /// A compute API call reported failure.
    #[error("device error: {0}")]
    Device(String),

    /// A configuration value that no run can satisfy.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("dispatch planning failed: {0}")]
    Planning(String),

    /// The device cannot hold the working set of one size in local memory.
    #[error("not enough local memory on the device: {required} bytes required, {available} available")]
    InsufficientLocalMemory { required: u64, available: u64 },

    #[error("verification failed: {0}")]
    Verification(Mismatch),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error marks the ceiling of what the device can run,
    /// as opposed to a fault.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Error::InsufficientLocalMemory { .. })
    }
}

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for Error {
    fn from(err: opencl3::error_codes::ClError) -> Self {
        Error::Device(err.to_string())
    }
}
