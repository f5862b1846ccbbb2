//! Writing the pixel data and metadata of one acquisition to disk.
use std::{
    fs::{self, File},
    io::{BufWriter, Seek, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};
use ndarray::Array5;
use tiff::{
    encoder::{
        TiffEncoder, TiffKind, TiffValue,
        colortype::{ColorType, Gray8, Gray16, Gray32Float},
        compression::{Deflate, DeflateLevel},
    },
    tags::Tag,
};

use crate::{Error, Result, reshape::PixelData};

/// Largest raw payload written as a classic TIFF.
pub const BIGTIFF_THRESHOLD: u64 = u32::MAX as u64;

/// Destination of the images of one acquisition.
pub trait ImageSink {
    /// Write `images` in order, with `xml` as the metadata of the file.
    fn write(&mut self, path: &Path, images: &[PixelData], xml: &str) -> Result<()>;
}

/// Writes a multi-page OME-TIFF: one Deflate-compressed page per (t, z) plane,
/// images one after another, the OME-XML in the first page's ImageDescription.
///
/// The file is written next to its destination with a `.part` suffix and renamed
/// into place once complete, so a failed write leaves nothing behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmeTiffWriter {
    bigtiff_threshold: u64,
}

impl Default for OmeTiffWriter {
    fn default() -> Self {
        Self {
            bigtiff_threshold: BIGTIFF_THRESHOLD,
        }
    }
}

impl OmeTiffWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to BigTIFF once the raw payload exceeds `bytes`.
    pub fn with_bigtiff_threshold(mut self, bytes: u64) -> Self {
        self.bigtiff_threshold = bytes;
        self
    }

    fn write_file(&self, path: &Path, images: &[PixelData], xml: &str) -> Result<()> {
        let payload: u64 = images.iter().map(PixelData::byte_len).sum();
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        if payload > self.bigtiff_threshold {
            debug!("{payload} bytes of pixels, writing BigTIFF");
            let mut encoder = TiffEncoder::new_big(&mut writer).map_err(Error::wrap)?;
            write_pages(&mut encoder, images, xml)?;
        } else {
            let mut encoder = TiffEncoder::new(&mut writer).map_err(Error::wrap)?;
            write_pages(&mut encoder, images, xml)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ImageSink for OmeTiffWriter {
    fn write(&mut self, path: &Path, images: &[PixelData], xml: &str) -> Result<()> {
        info!("Writing file {}", path.display());
        let part = part_path(path);
        let result = self
            .write_file(&part, images, xml)
            .and_then(|()| fs::rename(&part, path).map_err(Error::from));
        if let Err(error) = result {
            if part.exists() {
                fs::remove_file(&part).ok();
            }
            return Err(Error::sink_write(path, error));
        }
        Ok(())
    }
}

/// `path` with `.part` appended, where a file is written before it is complete.
pub(crate) fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_pages<W: Write + Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    images: &[PixelData],
    xml: &str,
) -> Result<()> {
    let mut description = Some(xml);
    for image in images {
        match image {
            PixelData::U8(a) => write_image::<Gray8, _, _>(encoder, a, &mut description)?,
            PixelData::U16(a) => write_image::<Gray16, _, _>(encoder, a, &mut description)?,
            PixelData::F32(a) => write_image::<Gray32Float, _, _>(encoder, a, &mut description)?,
        }
    }
    Ok(())
}

/// Write every `(y, x)` plane of `array` as one page, in series, time, z order.
fn write_image<C, W, K>(
    encoder: &mut TiffEncoder<W, K>,
    array: &Array5<C::Inner>,
    description: &mut Option<&str>,
) -> Result<()>
where
    C: ColorType,
    C::Inner: Clone,
    [C::Inner]: TiffValue,
    W: Write + Seek,
    K: TiffKind,
{
    let (_, _, _, height, width) = array.dim();
    let plane_len = height * width;
    if plane_len == 0 {
        return Err(Error::general("cannot write an empty plane"));
    }
    let width = u32::try_from(width).map_err(Error::wrap)?;
    let height = u32::try_from(height).map_err(Error::wrap)?;
    let standard = array.as_standard_layout();
    let data = standard
        .as_slice()
        .ok_or_else(|| Error::general("pixel data is not contiguous"))?;
    for plane in data.chunks_exact(plane_len) {
        let mut page = encoder
            .new_image_with_compression::<C, _>(
                width,
                height,
                Deflate::with_level(DeflateLevel::Best),
            )
            .map_err(Error::wrap)?;
        if let Some(xml) = description.take() {
            page.encoder()
                .write_tag(Tag::ImageDescription, xml)
                .map_err(Error::wrap)?;
        }
        page.write_data(plane).map_err(Error::wrap)?;
    }
    Ok(())
}
