//! Local image pipeline stages.
//!
//! - **capture**: acquire an image and run detection + blur over it
//! - **decode**: load and decode images with limits and a timeout
//! - **validate**: pre-decode checks on acquired files
//! - **discovery**: find photos in directories for batch runs

pub mod capture;
pub mod decode;
pub mod discovery;
pub mod validate;

pub use capture::{CapturePipeline, CaptureSource, FileImageSource, ImageSource};
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use validate::Validator;
