//! MetaImage (`.mha` / `.mhd`) codec.
//!
//! A MetaImage file is a `Key = Value` text header followed by raw pixel data.
//! `ElementDataFile = LOCAL` means the data follows the header in the same
//! file (`.mha`); any other value names a file next to the header (`.mhd`).
//!
//! `TransformMatrix` lists the direction of each index axis in turn, so entry
//! `axis * n + row` is row `row` of that axis's direction column.

use crate::core::container::{DataContainer, PixelBuffer, PixelType};
use crate::core::error::{IoError, IoResult};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use crate::io::{ImageCodec, ImageInformation};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reads and writes MetaImage files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaImageCodec;

/// Element types understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    UChar,
    Short,
    UShort,
    Int,
    Float,
    Double,
}

impl ElementType {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "MET_UCHAR" => ElementType::UChar,
            "MET_SHORT" => ElementType::Short,
            "MET_USHORT" => ElementType::UShort,
            "MET_INT" => ElementType::Int,
            "MET_FLOAT" => ElementType::Float,
            "MET_DOUBLE" => ElementType::Double,
            _ => return None,
        })
    }

    fn tag(self) -> &'static str {
        match self {
            ElementType::UChar => "MET_UCHAR",
            ElementType::Short => "MET_SHORT",
            ElementType::UShort => "MET_USHORT",
            ElementType::Int => "MET_INT",
            ElementType::Float => "MET_FLOAT",
            ElementType::Double => "MET_DOUBLE",
        }
    }

    fn bytes(self) -> usize {
        match self {
            ElementType::UChar => 1,
            ElementType::Short | ElementType::UShort => 2,
            ElementType::Int | ElementType::Float => 4,
            ElementType::Double => 8,
        }
    }

    /// Decode one element. `bytes` has exactly `self.bytes()` entries.
    fn decode(self, bytes: &[u8], msb: bool) -> f32 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(bytes);
                if msb {
                    <$t>::from_be_bytes(raw)
                } else {
                    <$t>::from_le_bytes(raw)
                }
            }};
        }
        match self {
            ElementType::UChar => bytes[0] as f32,
            ElementType::Short => read!(i16, 2) as f32,
            ElementType::UShort => read!(u16, 2) as f32,
            ElementType::Int => read!(i32, 4) as f32,
            ElementType::Float => read!(f32, 4),
            ElementType::Double => read!(f64, 8) as f32,
        }
    }
}

/// Parsed header fields.
#[derive(Debug, Clone)]
struct Header {
    size: Vec<usize>,
    geometry: PhysicalGeometry,
    element: ElementType,
    channels: usize,
    msb: bool,
    data_file: String,
    /// Length of the pixel data in bytes.
    data_bytes: usize,
}

impl Header {
    fn pixel_type(&self) -> PixelType {
        if self.channels == 3 {
            PixelType::Rgb
        } else {
            PixelType::Scalar
        }
    }

    fn information(&self) -> ImageInformation {
        ImageInformation {
            region: Region::from_size(&self.size),
            geometry: self.geometry.clone(),
            pixel_type: self.pixel_type(),
        }
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> IoError {
    IoError::MalformedHeader {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn parse_list<T: FromStr>(path: &Path, key: &str, value: &str, count: usize) -> IoResult<Vec<T>> {
    let values: Vec<T> = value
        .split_whitespace()
        .map(|v| v.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed(path, format!("{} has a non-numeric entry: '{}'", key, value)))?;
    if values.len() != count {
        return Err(malformed(
            path,
            format!("{} has {} entries, expected {}", key, values.len(), count),
        ));
    }
    Ok(values)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1")
}

/// Read header lines up to and including `ElementDataFile`.
fn read_header<R: BufRead>(path: &Path, reader: &mut R) -> IoResult<Header> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(malformed(path, "missing ElementDataFile"));
        }
        let text = std::str::from_utf8(&line).map_err(|_| malformed(path, "header is not text"))?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| malformed(path, format!("expected 'Key = Value', got '{}'", text)))?;
        let (key, value) = (key.trim(), value.trim());
        if key == "ElementDataFile" {
            fields.insert(key.to_string(), value.to_string());
            break;
        }
        fields.insert(key.to_string(), value.to_string());
    }

    let field = |names: &[&str]| names.iter().find_map(|n| fields.get(*n).map(String::as_str));

    let dimension: usize = field(&["NDims"])
        .ok_or_else(|| malformed(path, "missing NDims"))?
        .parse()
        .map_err(|_| malformed(path, "NDims is not a number"))?;
    if dimension == 0 {
        return Err(malformed(path, "NDims must be positive"));
    }
    let size: Vec<usize> = parse_list(
        path,
        "DimSize",
        field(&["DimSize"]).ok_or_else(|| malformed(path, "missing DimSize"))?,
        dimension,
    )?;
    let spacing = match field(&["ElementSpacing", "ElementSize"]) {
        Some(value) => parse_list(path, "ElementSpacing", value, dimension)?,
        None => vec![1.0; dimension],
    };
    let origin = match field(&["Offset", "Origin", "Position"]) {
        Some(value) => parse_list(path, "Offset", value, dimension)?,
        None => vec![0.0; dimension],
    };
    let direction = match field(&["TransformMatrix", "Rotation", "Orientation"]) {
        Some(value) => {
            let matrix: Vec<f64> = parse_list(path, "TransformMatrix", value, dimension * dimension)?;
            (0..dimension)
                .map(|row| (0..dimension).map(|axis| matrix[axis * dimension + row]).collect())
                .collect()
        }
        None => PhysicalGeometry::identity(dimension).direction().to_vec(),
    };
    let geometry = PhysicalGeometry::new(origin, spacing, direction)
        .map_err(|e| malformed(path, e.to_string()))?;

    let element_tag = field(&["ElementType"]).ok_or_else(|| malformed(path, "missing ElementType"))?;
    let element = ElementType::from_tag(element_tag)
        .ok_or_else(|| IoError::Unsupported(format!("element type {}", element_tag)))?;
    let channels: usize = match field(&["ElementNumberOfChannels"]) {
        Some(value) => value
            .parse()
            .map_err(|_| malformed(path, "ElementNumberOfChannels is not a number"))?,
        None => 1,
    };
    if channels != 1 && !(channels == 3 && element == ElementType::UChar) {
        return Err(IoError::Unsupported(format!(
            "{} channels of {}",
            channels,
            element.tag()
        )));
    }
    if field(&["CompressedData"]).is_some_and(parse_bool) {
        return Err(IoError::Unsupported("compressed MetaImage data".to_string()));
    }
    let msb = field(&["BinaryDataByteOrderMSB", "ElementByteOrderMSB"]).is_some_and(parse_bool);
    let data_file = field(&["ElementDataFile"])
        .unwrap_or("LOCAL")
        .to_string();
    let data_bytes = size
        .iter()
        .try_fold(channels * element.bytes(), |total, &s| total.checked_mul(s))
        .ok_or_else(|| malformed(path, format!("DimSize {:?} is too large", size)))?;

    Ok(Header {
        size,
        geometry,
        element,
        channels,
        msb,
        data_file,
        data_bytes,
    })
}

fn decode_pixels(path: &Path, header: &Header, reader: &mut dyn Read) -> IoResult<PixelBuffer> {
    let element_bytes = header.element.bytes();
    let mut raw = Vec::new();
    reader.take(header.data_bytes as u64).read_to_end(&mut raw)?;
    if raw.len() != header.data_bytes {
        return Err(malformed(
            path,
            format!("expected {} bytes of pixel data, found {}", header.data_bytes, raw.len()),
        ));
    }

    Ok(match header.pixel_type() {
        PixelType::Rgb => PixelBuffer::Rgb(
            raw.chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        PixelType::Scalar => PixelBuffer::Scalar(
            raw.chunks_exact(element_bytes)
                .map(|c| header.element.decode(c, header.msb))
                .collect(),
        ),
    })
}

fn data_file_path(header_path: &Path, name: &str) -> PathBuf {
    header_path
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ImageCodec for MetaImageCodec {
    fn name(&self) -> &'static str {
        "metaimage"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mha", "mhd"]
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        let start = header
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(header.len());
        let header = &header[start..];
        header.starts_with(b"ObjectType") || header.starts_with(b"NDims")
    }

    fn read_information(&self, path: &Path) -> IoResult<ImageInformation> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(read_header(path, &mut reader)?.information())
    }

    fn read(&self, path: &Path) -> IoResult<DataContainer> {
        let mut reader = BufReader::new(File::open(path)?);
        let header = read_header(path, &mut reader)?;

        let buffer = if header.data_file.eq_ignore_ascii_case("LOCAL") {
            decode_pixels(path, &header, &mut reader)?
        } else {
            let data_path = data_file_path(path, &header.data_file);
            let mut data = BufReader::new(File::open(&data_path)?);
            decode_pixels(&data_path, &header, &mut data)?
        };

        let info = header.information();
        DataContainer::from_buffer(info.region, info.geometry, buffer)
            .ok_or_else(|| malformed(path, "pixel count does not match DimSize"))
    }

    fn write(&self, path: &Path, container: &DataContainer) -> IoResult<()> {
        if !container.has_data() {
            return Err(IoError::NotBuffered);
        }
        let region = container.buffered_region();
        let geometry = container.geometry();
        let n = region.dimension();

        let origin = geometry.index_to_point(region.index());
        let transform = (0..n).flat_map(|axis| (0..n).map(move |row| geometry.direction()[row][axis]));
        let (element, channels) = match container.pixel_type() {
            PixelType::Scalar => (ElementType::Float, 1),
            PixelType::Rgb => (ElementType::UChar, 3),
        };

        let detached = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mhd"));
        let data_name = if detached {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| IoError::Unsupported(format!("file name {}", path.display())))?;
            format!("{}.raw", stem)
        } else {
            "LOCAL".to_string()
        };

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "ObjectType = Image")?;
        writeln!(out, "NDims = {}", n)?;
        writeln!(out, "BinaryData = True")?;
        writeln!(out, "BinaryDataByteOrderMSB = False")?;
        writeln!(out, "CompressedData = False")?;
        writeln!(out, "TransformMatrix = {}", join(transform))?;
        writeln!(out, "Offset = {}", join(origin))?;
        writeln!(out, "ElementSpacing = {}", join(geometry.spacing().iter()))?;
        writeln!(out, "DimSize = {}", join(region.size().iter()))?;
        if channels != 1 {
            writeln!(out, "ElementNumberOfChannels = {}", channels)?;
        }
        writeln!(out, "ElementType = {}", element.tag())?;
        writeln!(out, "ElementDataFile = {}", data_name)?;

        let mut data: Box<dyn Write> = if detached {
            out.flush()?;
            Box::new(BufWriter::new(File::create(data_file_path(path, &data_name))?))
        } else {
            Box::new(out)
        };
        match container.buffer() {
            PixelBuffer::Scalar(values) => {
                for value in values {
                    data.write_all(&value.to_le_bytes())?;
                }
            }
            PixelBuffer::Rgb(values) => {
                for value in values {
                    data.write_all(value)?;
                }
            }
        }
        data.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_raw(dir: &Path, name: &str, header: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(data);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_signature() {
        assert!(MetaImageCodec.matches_signature(b"ObjectType = Image\nNDims = 2"));
        assert!(MetaImageCodec.matches_signature(b"\nNDims = 3"));
        assert!(!MetaImageCodec.matches_signature(b"\x89PNG\r\n"));
    }

    #[test]
    fn test_reads_big_endian_shorts() {
        let dir = tempfile::tempdir().unwrap();
        let header = "NDims = 1\nDimSize = 2\nElementType = MET_SHORT\n\
                      BinaryDataByteOrderMSB = True\nElementDataFile = LOCAL\n";
        let path = write_raw(dir.path(), "a.mha", header, &[0x01, 0x00, 0xff, 0xfe]);

        let container = MetaImageCodec.read(&path).unwrap();
        assert_eq!(container.scalars().unwrap(), &[256.0, -2.0]);
    }

    #[test]
    fn test_information_reads_direction_columns() {
        let dir = tempfile::tempdir().unwrap();
        let header = "NDims = 2\nDimSize = 3 4\nElementSpacing = 0.5 2\nOffset = 1 -1\n\
                      TransformMatrix = 0 1 -1 0\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n";
        let path = write_raw(dir.path(), "b.mha", header, &[]);

        let info = MetaImageCodec.read_information(&path).unwrap();
        assert_eq!(info.region, Region::from_size(&[3, 4]));
        assert_eq!(info.geometry.spacing(), &[0.5, 2.0]);
        assert_eq!(info.geometry.direction(), &[vec![0.0, -1.0], vec![1.0, 0.0]]);
        assert_eq!(info.pixel_type, PixelType::Scalar);
    }

    #[test]
    fn test_truncated_data_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let header = "NDims = 1\nDimSize = 4\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n";
        let path = write_raw(dir.path(), "c.mha", header, &[0; 6]);

        assert!(matches!(
            MetaImageCodec.read(&path),
            Err(IoError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_oversized_dimensions_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let header = "NDims = 3\nDimSize = 4294967296 4294967296 4294967296\n\
                      ElementType = MET_FLOAT\nElementDataFile = LOCAL\n";
        let path = write_raw(dir.path(), "huge.mha", header, &[0; 16]);

        assert!(matches!(
            MetaImageCodec.read_information(&path),
            Err(IoError::MalformedHeader { .. })
        ));
        assert!(matches!(
            MetaImageCodec.read(&path),
            Err(IoError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_raw(dir.path(), "d.mha", "NDims = 2\nElementDataFile = LOCAL\n", &[]);
        assert!(matches!(
            MetaImageCodec.read_information(&path),
            Err(IoError::MalformedHeader { .. })
        ));

        let path = write_raw(
            dir.path(),
            "e.mha",
            "NDims = 1\nDimSize = 1\nElementType = MET_LONG\nElementDataFile = LOCAL\n",
            &[],
        );
        assert!(matches!(
            MetaImageCodec.read_information(&path),
            Err(IoError::Unsupported(_))
        ));
    }
}
