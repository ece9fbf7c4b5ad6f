use crate::ConfigError;

use volume_stream_core::prelude::*;

use bytemuck::Pod;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// The numeric element type of a pyramid level.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl DataType {
    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::I8 => "int8",
            DataType::U16 => "uint16",
            DataType::I16 => "int16",
            DataType::U32 => "uint32",
            DataType::I32 => "int32",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        }
    }
}

impl FromStr for DataType {
    type Err = ConfigError;

    /// Accepts canonical names (`"uint8"`, `"float32"`) and little-endian or byte-order-free array type strings (`"|u1"`,
    /// `"<f4"`). Big-endian strings are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || ConfigError::UnsupportedDataType(s.to_string());
        let trimmed = s.trim().to_ascii_lowercase();
        let code = match trimmed.as_bytes().first() {
            Some(b'>') => return Err(unsupported()),
            Some(b'<') | Some(b'|') | Some(b'=') => &trimmed[1..],
            _ => trimmed.as_str(),
        };

        Ok(match code {
            "uint8" | "u8" | "u1" => DataType::U8,
            "int8" | "i8" | "i1" => DataType::I8,
            "uint16" | "u16" | "u2" => DataType::U16,
            "int16" | "i16" | "i2" => DataType::I16,
            "uint32" | "u32" | "u4" => DataType::U32,
            "int32" | "i32" | "i4" => DataType::I32,
            "float32" | "f32" | "f4" => DataType::F32,
            "float64" | "f64" | "f8" => DataType::F64,
            _ => return Err(unsupported()),
        })
    }
}

/// A dense block of elements in `(z, y, x, channel)` row-major order, stored as little-endian bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionData {
    dtype: DataType,
    shape: Point3i,
    channels: usize,
    bytes: Vec<u8>,
}

impl RegionData {
    /// Wraps `bytes`, returning `None` if the length does not match `shape`, `channels` and `dtype`.
    pub fn new(dtype: DataType, shape: Point3i, channels: usize, bytes: Vec<u8>) -> Option<Self> {
        let shape = shape.join(&Point3i::ZERO);
        let expected = shape.volume() as usize * channels * dtype.size();

        if bytes.len() == expected {
            Some(Self {
                dtype,
                shape,
                channels,
                bytes,
            })
        } else {
            None
        }
    }

    /// A zero-filled block.
    pub fn zeros(dtype: DataType, shape: Point3i, channels: usize) -> Self {
        let shape = shape.join(&Point3i::ZERO);
        let len = shape.volume() as usize * channels * dtype.size();

        Self {
            dtype,
            shape,
            channels,
            bytes: vec![0; len],
        }
    }

    /// Copies typed `elements` into a new block.
    pub fn from_elements<T: Pod>(
        dtype: DataType,
        shape: Point3i,
        channels: usize,
        elements: &[T],
    ) -> Option<Self> {
        if std::mem::size_of::<T>() != dtype.size() {
            return None;
        }

        Self::new(dtype, shape, channels, bytemuck::cast_slice(elements).to_vec())
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// `(z, y, x)`.
    #[inline]
    pub fn shape(&self) -> Point3i {
        self.shape
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Element strides for the `(z, y, x)` axes. Channels are contiguous.
    #[inline]
    pub fn stride(&self) -> [usize; 3] {
        let c = self.channels;
        let [_, y, x] = self.shape.0;
        let (y, x) = (y as usize, x as usize);

        [y * x * c, x * c, c]
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.shape.volume() as usize * self.channels
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies the elements out as `T`, returning `None` if `T` does not match the data type's size.
    pub fn to_vec<T: Pod>(&self) -> Option<Vec<T>> {
        if std::mem::size_of::<T>() != self.dtype.size() {
            return None;
        }

        Some(bytemuck::pod_collect_to_vec(&self.bytes))
    }

    /// Copies `src_region` (in `src`'s local pixel coordinates) so that its first pixel lands at `dst_offset` in `self`.
    ///
    /// Parts that fall outside either block are skipped. Both blocks must share data type and channel count.
    pub fn copy_from(&mut self, src: &RegionData, src_region: &PixelRegion, dst_offset: Point3i) {
        debug_assert_eq!(self.dtype, src.dtype);
        debug_assert_eq!(self.channels, src.channels);

        let src_region = src_region.intersection(&PixelRegion::full(src.shape));
        let dst_region = PixelRegion::new(dst_offset, dst_offset + src_region.shape())
            .intersection(&PixelRegion::full(self.shape));
        let shape = dst_region.shape();
        if shape.volume() <= 0 {
            return;
        }
        let src_start = src_region.start + (dst_region.start - dst_offset);

        let [depth, rows, row_len] = shape.0;
        let [src_z, src_y, src_x] = src_start.0;
        let [dst_z, dst_y, dst_x] = dst_region.start.0;

        let unit = self.dtype.size();
        let row_bytes = row_len as usize * self.channels * unit;
        let [src_sz, src_sy, _] = src.stride();
        let [dst_sz, dst_sy, _] = self.stride();
        for z in 0..depth {
            for y in 0..rows {
                let s = ((src_z + z) as usize * src_sz + (src_y + y) as usize * src_sy + src_x as usize * src.channels)
                    * unit;
                let d = ((dst_z + z) as usize * dst_sz + (dst_y + y) as usize * dst_sy + dst_x as usize * self.channels)
                    * unit;
                self.bytes[d..d + row_bytes].copy_from_slice(&src.bytes[s..s + row_bytes]);
            }
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
