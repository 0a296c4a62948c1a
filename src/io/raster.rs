//! PNG, TIFF and BMP through the `image` crate.
//!
//! Raster files are 2-D with unit spacing. Luma images load as scalar
//! containers holding the raw channel values; anything with color loads as
//! RGB. Scalars are rounded and clamped to `[0, 255]` when written.

use crate::core::container::{DataContainer, PixelBuffer, PixelType};
use crate::core::error::{IoError, IoResult};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use crate::io::{ImageCodec, ImageInformation};
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// Reads and writes 2-D raster formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

fn is_luma(color: ColorType) -> bool {
    !color.has_color()
}

fn region_of(width: u32, height: u32) -> Region {
    Region::from_size(&[width as usize, height as usize])
}

/// Width and height of a 2-D region as `image` dimensions.
fn raster_extent(region: &Region) -> IoResult<(u32, u32)> {
    let side = |axis: usize| {
        u32::try_from(region.size()[axis]).map_err(|_| {
            IoError::Unsupported(format!(
                "raster side of {} pixels on axis {}",
                region.size()[axis],
                axis
            ))
        })
    };
    Ok((side(0)?, side(1)?))
}

impl ImageCodec for RasterCodec {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "tif", "tiff", "bmp"]
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(b"\x89PNG\r\n\x1a\n")
            || header.starts_with(b"II*\0")
            || header.starts_with(b"MM\0*")
            || header.starts_with(b"BM")
    }

    fn read_information(&self, path: &Path) -> IoResult<ImageInformation> {
        let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
        let (width, height) = decoder.dimensions();
        let pixel_type = if is_luma(decoder.color_type()) {
            PixelType::Scalar
        } else {
            PixelType::Rgb
        };
        Ok(ImageInformation {
            region: region_of(width, height),
            geometry: PhysicalGeometry::identity(2),
            pixel_type,
        })
    }

    fn read(&self, path: &Path) -> IoResult<DataContainer> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let region = region_of(image.width(), image.height());
        let buffer = match image.color() {
            ColorType::L16 | ColorType::La16 => PixelBuffer::Scalar(
                image.to_luma16().pixels().map(|p| p.0[0] as f32).collect(),
            ),
            color if is_luma(color) => PixelBuffer::Scalar(
                image.to_luma8().pixels().map(|p| p.0[0] as f32).collect(),
            ),
            _ => PixelBuffer::Rgb(image.to_rgb8().pixels().map(|p| p.0).collect()),
        };
        DataContainer::from_buffer(region, PhysicalGeometry::identity(2), buffer)
            .ok_or_else(|| IoError::Unsupported(format!("decoded size of {}", path.display())))
    }

    fn write(&self, path: &Path, container: &DataContainer) -> IoResult<()> {
        if !container.has_data() {
            return Err(IoError::NotBuffered);
        }
        let region = container.buffered_region();
        if region.dimension() != 2 {
            return Err(IoError::Unsupported(format!(
                "raster files are 2-D, container has {} axes",
                region.dimension()
            )));
        }
        let (width, height) = raster_extent(region)?;

        let image = match container.buffer() {
            PixelBuffer::Scalar(values) => {
                let bytes = values
                    .iter()
                    .map(|v| v.round().clamp(0.0, 255.0) as u8)
                    .collect();
                image::GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8)
            }
            PixelBuffer::Rgb(values) => {
                let bytes = values.iter().flatten().copied().collect();
                image::RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8)
            }
        }
        .ok_or(IoError::NotBuffered)?;

        image.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures() {
        assert!(RasterCodec.matches_signature(b"\x89PNG\r\n\x1a\nrest"));
        assert!(RasterCodec.matches_signature(b"II*\0...."));
        assert!(RasterCodec.matches_signature(b"BM...."));
        assert!(!RasterCodec.matches_signature(b"ObjectType = Image"));
    }

    #[test]
    fn test_write_rejects_3d() {
        let container = DataContainer::from_scalars(
            Region::from_size(&[1, 1, 1]),
            PhysicalGeometry::identity(3),
            vec![0.0],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RasterCodec.write(&dir.path().join("a.png"), &container),
            Err(IoError::Unsupported(_))
        ));
    }

    #[test]
    fn test_extent_beyond_u32_is_unsupported() {
        let wide = Region::from_size(&[u32::MAX as usize + 1, 1]);
        assert!(matches!(raster_extent(&wide), Err(IoError::Unsupported(_))));
        let tall = Region::from_size(&[3, u32::MAX as usize + 5]);
        assert!(matches!(raster_extent(&tall), Err(IoError::Unsupported(_))));
        assert_eq!(raster_extent(&Region::from_size(&[640, 480])).unwrap(), (640, 480));
    }

    #[test]
    fn test_scalar_png_round_trip_clamps() {
        let container = DataContainer::from_scalars(
            Region::from_size(&[3, 1]),
            PhysicalGeometry::identity(2),
            vec![-4.0, 99.6, 300.0],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        RasterCodec.write(&path, &container).unwrap();

        let info = RasterCodec.read_information(&path).unwrap();
        assert_eq!(info.pixel_type, PixelType::Scalar);
        assert_eq!(info.region, Region::from_size(&[3, 1]));

        let back = RasterCodec.read(&path).unwrap();
        assert_eq!(back.scalars().unwrap(), &[0.0, 100.0, 255.0]);
    }
}
