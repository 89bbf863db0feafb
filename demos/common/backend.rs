use burn::prelude::*;

pub type Element = f32;

#[cfg(feature = "dev-ndarray")]
pub type MainBackend = burn::backend::NdArray<Element>;
#[cfg(feature = "dev-tch-cpu")]
pub type MainBackend = burn::backend::libtorch::LibTorch<Element>;
#[cfg(feature = "dev-wgpu")]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(feature = "dev-cuda")]
pub type MainBackend = burn::backend::Cuda<Element, i32>;

pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(any(
    feature = "dev-ndarray",
    feature = "dev-tch-cpu",
    feature = "dev-wgpu",
    feature = "dev-cuda",
))]
impl MainDevice for MainBackend {}

#[cfg(not(feature = "_dev-has-backend"))]
mod err {
    use super::*;
    std::compile_error!(
        "No demo backend selected, enable one of the `dev-ndarray`, `dev-wgpu`, `dev-cuda` or `dev-tch-cpu` features."
    );

    // keeps the rest of the demo type-checking so only the error above is reported
    pub type MainBackend = burn::backend::NdArray<Element>;
    impl MainDevice for MainBackend {}
}
#[cfg(not(feature = "_dev-has-backend"))]
pub use err::*;
