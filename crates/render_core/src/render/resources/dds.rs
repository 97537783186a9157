//! Minimal DDS container parsing
//!
//! Only the fields the renderer needs are interpreted: width, height and mip
//! count. The payload is assumed to be an uncompressed RGBA8 mip chain.

use bytemuck::{Pod, Zeroable};

use super::image::ImageError;

/// `"DDS "` little-endian
pub const DDS_MAGIC: [u8; 4] = *b"DDS ";

/// Pixel format block inside [`DdsHeader`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct DdsPixelFormat {
    pub size: u32,
    pub flags: u32,
    pub four_cc: u32,
    pub rgb_bit_count: u32,
    pub r_bit_mask: u32,
    pub g_bit_mask: u32,
    pub b_bit_mask: u32,
    pub a_bit_mask: u32,
}

/// The 124-byte header following the magic
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct DdsHeader {
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub reserved1: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps1: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
}

/// Parsed DDS file borrowing its pixel payload
#[derive(Debug, Clone, Copy)]
pub struct DdsImage<'a> {
    /// Width of mip 0
    pub width: u32,
    /// Height of mip 0
    pub height: u32,
    /// Mip levels in the payload, at least 1
    pub mip_levels: u32,
    /// Raw mip chain
    pub data: &'a [u8],
}

impl<'a> DdsImage<'a> {
    /// Parse a DDS file already read into memory
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ImageError> {
        const HEADER_START: usize = DDS_MAGIC.len();
        const DATA_START: usize = HEADER_START + std::mem::size_of::<DdsHeader>();

        if bytes.len() < DATA_START {
            return Err(ImageError::InvalidDds(format!(
                "file is {} bytes, header needs {DATA_START}",
                bytes.len()
            )));
        }
        if bytes[..HEADER_START] != DDS_MAGIC {
            return Err(ImageError::InvalidDds("missing \"DDS \" magic".to_string()));
        }

        let header: DdsHeader = bytemuck::pod_read_unaligned(&bytes[HEADER_START..DATA_START]);
        if header.width == 0 || header.height == 0 {
            return Err(ImageError::InvalidDds(format!(
                "zero-sized image {}x{}",
                header.width, header.height
            )));
        }

        Ok(Self {
            width: header.width,
            height: header.height,
            // Files without DDSD_MIPMAPCOUNT store 0
            mip_levels: header.mip_map_count.max(1),
            data: &bytes[DATA_START..],
        })
    }
}

/// Build an uncompressed DDS file in memory
#[cfg(test)]
pub(crate) fn encode(width: u32, height: u32, mip_levels: u32, data: &[u8]) -> Vec<u8> {
    let header = DdsHeader {
        size: std::mem::size_of::<DdsHeader>() as u32,
        height,
        width,
        mip_map_count: mip_levels,
        pixel_format: DdsPixelFormat {
            size: std::mem::size_of::<DdsPixelFormat>() as u32,
            rgb_bit_count: 32,
            ..DdsPixelFormat::default()
        },
        ..DdsHeader::default()
    };

    let mut bytes = Vec::with_capacity(DDS_MAGIC.len() + std::mem::size_of::<DdsHeader>() + data.len());
    bytes.extend_from_slice(&DDS_MAGIC);
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(data);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_124_bytes() {
        assert_eq!(std::mem::size_of::<DdsHeader>(), 124);
    }

    #[test]
    fn test_parse_reads_dimensions_and_payload() {
        let payload = vec![7u8; 4 * 4 * 4 + 2 * 2 * 4 + 4];
        let file = encode(4, 4, 3, &payload);

        let image = DdsImage::parse(&file).unwrap();
        assert_eq!((image.width, image.height, image.mip_levels), (4, 4, 3));
        assert_eq!(image.data, payload.as_slice());
    }

    #[test]
    fn test_zero_mip_count_means_one_level() {
        let file = encode(2, 2, 0, &[0; 16]);
        assert_eq!(DdsImage::parse(&file).unwrap().mip_levels, 1);
    }

    #[test]
    fn test_truncated_and_wrong_magic_are_rejected() {
        assert!(matches!(DdsImage::parse(b"DDS "), Err(ImageError::InvalidDds(_))));

        let mut file = encode(2, 2, 1, &[0; 16]);
        file[0] = b'X';
        assert!(matches!(DdsImage::parse(&file), Err(ImageError::InvalidDds(_))));
    }
}
