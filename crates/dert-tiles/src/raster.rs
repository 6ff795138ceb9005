//! Raster tile decoding.
//!
//! Tiles are stored as one image file each. Decoding produces the raw
//! sample bytes plus the layout needed to interpret them; the numeric type
//! attached to the result comes from the layer's declared type, corrected
//! for tiles whose band count contradicts it.

use crate::tile_id::TileId;
use crate::{Result, TileError};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::ColorType;

/// Numeric interpretation of a tile's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    UnsignedByte,
    Integer,
    UnsignedInteger,
    Short,
    UnsignedShort,
    Float,
    Double,
    Long,
    Unknown,
}

impl DataType {
    /// Whether samples are IEEE floats.
    pub fn is_floating_point(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    fn name(self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::UnsignedByte => "UnsignedByte",
            DataType::Integer => "Integer",
            DataType::UnsignedInteger => "UnsignedInteger",
            DataType::Short => "Short",
            DataType::UnsignedShort => "UnsignedShort",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::Long => "Long",
            DataType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        let data_type = match s.trim() {
            "Byte" => DataType::Byte,
            "UnsignedByte" => DataType::UnsignedByte,
            "Integer" => DataType::Integer,
            "UnsignedInteger" => DataType::UnsignedInteger,
            "Short" => DataType::Short,
            "UnsignedShort" => DataType::UnsignedShort,
            "Float" => DataType::Float,
            "Double" => DataType::Double,
            "Long" => DataType::Long,
            "Unknown" => DataType::Unknown,
            other => return Err(TileError::UnsupportedDataType(other.to_string())),
        };
        Ok(data_type)
    }
}

/// Image format of the tile files in a landscape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Png,
    Tiff,
}

impl TileFormat {
    /// File extension used for tile files.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Tiff => "tif",
        }
    }
}

/// Pick the data type a decoded tile is tagged with.
///
/// Floating point declarations are trusted. Otherwise a tileset declared as
/// packed 4-band integers may contain stray grayscale tiles, and a grayscale
/// tileset may contain stray color tiles; the actual band count wins.
pub fn classify(declared: DataType, bands: u32) -> DataType {
    if declared.is_floating_point() {
        return declared;
    }
    match declared {
        DataType::UnsignedInteger if bands < 4 => DataType::UnsignedByte,
        DataType::UnsignedByte if bands > 1 => DataType::UnsignedInteger,
        other => other,
    }
}

/// Raw output of an image decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub bytes_per_pixel: u32,
    /// Row-major interleaved samples.
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Decode a tile file's bytes.
    pub fn decode(format: TileFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            TileFormat::Png => decode_png(bytes),
            TileFormat::Tiff => decode_tiff(bytes),
        }
    }
}

fn decode_png(bytes: &[u8]) -> Result<DecodedImage> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?;
    let color = image.color();
    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        bands: u32::from(color.channel_count()),
        bytes_per_pixel: u32::from(color.bytes_per_pixel()),
        data: image.into_bytes(),
    })
}

fn decode_tiff(bytes: &[u8]) -> Result<DecodedImage> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    // Tiles are small; the default limits only get in the way of wide float tiles.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 256 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let bands = match decoder.colortype()? {
        ColorType::Gray(_) | ColorType::Palette(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        other => return Err(TileError::UnsupportedDataType(format!("{other:?}"))),
    };

    let (sample_size, data): (u32, Vec<u8>) = match decoder.read_image()? {
        DecodingResult::U8(data) => (1, data),
        DecodingResult::I8(data) => (1, data.into_iter().map(|v| v as u8).collect()),
        DecodingResult::U16(data) => (2, data.into_iter().flat_map(u16::to_le_bytes).collect()),
        DecodingResult::I16(data) => (2, data.into_iter().flat_map(i16::to_le_bytes).collect()),
        DecodingResult::U32(data) => (4, data.into_iter().flat_map(u32::to_le_bytes).collect()),
        DecodingResult::I32(data) => (4, data.into_iter().flat_map(i32::to_le_bytes).collect()),
        DecodingResult::F32(data) => (4, data.into_iter().flat_map(f32::to_le_bytes).collect()),
        DecodingResult::U64(data) => (8, data.into_iter().flat_map(u64::to_le_bytes).collect()),
        DecodingResult::I64(data) => (8, data.into_iter().flat_map(i64::to_le_bytes).collect()),
        DecodingResult::F64(data) => (8, data.into_iter().flat_map(f64::to_le_bytes).collect()),
    };

    Ok(DecodedImage {
        width,
        height,
        bands,
        bytes_per_pixel: sample_size * bands,
        data,
    })
}

/// A decoded tile handed to the caller. The store keeps no copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub id: TileId,
    pub layer: String,
    pub width: u32,
    pub height: u32,
    pub data_type: DataType,
    pub bands: u32,
    pub bytes_per_pixel: u32,
    pub data: Vec<u8>,
}

impl RasterTile {
    /// Wrap a decoded image, tagging it with the corrected data type.
    pub fn from_decoded(id: TileId, layer: &str, declared: DataType, image: DecodedImage) -> Self {
        Self {
            id,
            layer: layer.to_string(),
            width: image.width,
            height: image.height,
            data_type: classify(declared, image.bands),
            bands: image.bands,
            bytes_per_pixel: image.bytes_per_pixel,
            data: image.data,
        }
    }

    /// Samples reinterpreted as little-endian `f32`, for `Float` tiles.
    pub fn f32_samples(&self) -> Option<Vec<f32>> {
        if self.data_type != DataType::Float || self.data.len() % 4 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}
