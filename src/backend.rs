//! Backend selection
//!
//! CUDA when the `cuda` feature is on, otherwise the NdArray CPU backend.
//! Everything else in the crate stays generic over `B: Backend`; only the CLI
//! pins the concrete type through these aliases.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(not(any(feature = "cuda", feature = "ndarray")))]
compile_error!("Enable a tensor backend: `ndarray` (default) or `cuda`");

/// Autodiff wrapper used for fine-tuning
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device handle for the selected backend
pub type DefaultDevice = <DefaultBackend as Backend>::Device;

pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Human-readable backend name for banners
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
