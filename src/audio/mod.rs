pub mod capture;
pub mod cpal_backend;
pub mod wav;

pub use capture::{
    CaptureBackend, CaptureConfig, CaptureFactory, DefaultCaptureFactory, ErrorCallback,
    SampleCallback,
};
pub use cpal_backend::CpalBackend;
pub use wav::WavWriterHandle;
