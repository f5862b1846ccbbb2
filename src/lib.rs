//! Conversion of Tomocube TCF acquisitions into OME-TIFF.
//!
//! An acquisition folder holds a TCF container plus a few text files written by
//! the acquisition software. [driver::Converter] reads them, lays every imaging
//! modality out as a `(series, time, z, y, x)` image, builds the OME metadata
//! and hands both to an [sink::ImageSink].
pub mod assemble;
pub mod builders;
pub mod config;
pub mod container;
pub mod driver;
mod error;
pub mod modality;
pub mod ome;
pub mod planes;
pub mod reshape;
pub mod sink;

pub use ndarray;

pub use error::{Error, Result};
