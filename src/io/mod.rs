//! Image file I/O.
//!
//! Codecs implement [`ImageCodec`] and live in a process-wide
//! [`CodecRegistry`]. Readers are chosen by content signature first and file
//! extension second; writers by extension.
//!
//! ```no_run
//! use lazyflow::io;
//!
//! io::register_builtin_codecs();
//! let image = io::read("volume.mha").unwrap();
//! io::write("slice.png", &image).unwrap();
//! ```

pub mod metaimage;
pub mod raster;
pub mod registry;

use crate::core::container::{DataContainer, PixelType};
use crate::core::error::IoResult;
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use metaimage::MetaImageCodec;
pub use raster::RasterCodec;
pub use registry::{global_registry, register_builtin_codecs, CodecRegistry};

/// Extent, geometry and pixel type of a file, read without its pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInformation {
    pub region: Region,
    pub geometry: PhysicalGeometry,
    pub pixel_type: PixelType,
}

/// A file format that can be read into and written from a [`DataContainer`].
pub trait ImageCodec: Send + Sync {
    /// Unique codec name. Registering another codec with the same name
    /// replaces this one.
    fn name(&self) -> &'static str;

    /// Lowercase file extensions without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether the first bytes of a file look like this format.
    fn matches_signature(&self, header: &[u8]) -> bool;

    /// Read extent and geometry only.
    fn read_information(&self, path: &Path) -> IoResult<ImageInformation>;

    /// Read the whole file into a fully buffered container.
    fn read(&self, path: &Path) -> IoResult<DataContainer>;

    /// Write the buffered region of a container.
    fn write(&self, path: &Path, container: &DataContainer) -> IoResult<()>;
}

/// Read a file's information through the global registry.
pub fn read_information(path: impl AsRef<Path>) -> IoResult<ImageInformation> {
    let path = path.as_ref();
    let codec = global_registry().read().reader_for(path)?;
    codec.read_information(path)
}

/// Read a file through the global registry.
pub fn read(path: impl AsRef<Path>) -> IoResult<DataContainer> {
    let path = path.as_ref();
    let codec = global_registry().read().reader_for(path)?;
    log::debug!("Reading {} with the {} codec", path.display(), codec.name());
    codec.read(path)
}

/// Write a container through the global registry.
pub fn write(path: impl AsRef<Path>, container: &DataContainer) -> IoResult<()> {
    let path = path.as_ref();
    let codec = global_registry().read().writer_for(path)?;
    log::debug!("Writing {} with the {} codec", path.display(), codec.name());
    codec.write(path, container)
}
