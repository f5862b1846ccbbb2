//! Gathering per-timestep datasets into `(series, time, z, y, x)` arrays.
use ndarray::{Array5, ArrayD};

use crate::{
    Error, Result,
    container::{Container, RawBlock},
    modality::{DataShape, Modality, PlanEntry},
    ome::PixelType,
    planes::ImageGeometry,
};

/// Pixels of one output image, axes `(series, time, z, y, x)`.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Array5<u8>),
    U16(Array5<u16>),
    F32(Array5<f32>),
}

impl PixelData {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelData::U8(_) => PixelType::Uint8,
            PixelData::U16(_) => PixelType::Uint16,
            PixelData::F32(_) => PixelType::Float,
        }
    }

    pub fn shape(&self) -> [usize; 5] {
        let dim = match self {
            PixelData::U8(a) => a.dim(),
            PixelData::U16(a) => a.dim(),
            PixelData::F32(a) => a.dim(),
        };
        [dim.0, dim.1, dim.2, dim.3, dim.4]
    }

    /// Number of 2D planes.
    pub fn plane_count(&self) -> usize {
        let [s, t, z, _, _] = self.shape();
        s * t * z
    }

    /// Size of the raw pixel payload in bytes.
    pub fn byte_len(&self) -> u64 {
        let n: usize = self.shape().iter().product();
        (n * self.pixel_type().byte_size()) as u64
    }
}

/// Read every timestep of a plan entry and reshape it.
pub fn load(container: &impl Container, entry: &PlanEntry) -> Result<PixelData> {
    let blocks = container
        .members(&entry.data_path)?
        .iter()
        .map(|name| container.read_block(&format!("{}/{name}", entry.data_path)))
        .collect::<Result<Vec<_>>>()?;
    reshape(entry.modality, blocks)
}

/// Stack one block per timestep into a 5-axis array.
///
/// Blocks must already have the modality's element type; nothing is converted.
pub fn reshape(modality: Modality, blocks: Vec<RawBlock>) -> Result<PixelData> {
    if blocks.is_empty() {
        return Err(Error::ArrayReshape(format!(
            "{} has no timesteps",
            modality.description()
        )));
    }
    let rule = modality.data_shape();
    let expected = modality.pixel_type();
    let wrong_type = |block: &RawBlock| {
        Error::ArrayReshape(format!(
            "{} should hold {expected} data, found {}",
            modality.description(),
            block.pixel_type()
        ))
    };
    let pixels = match expected {
        PixelType::Uint8 => PixelData::U8(stack(typed(blocks, wrong_type, |b| match b {
            RawBlock::U8(a) => Ok(a),
            other => Err(other),
        })?, rule)?),
        PixelType::Uint16 => PixelData::U16(stack(typed(blocks, wrong_type, |b| match b {
            RawBlock::U16(a) => Ok(a),
            other => Err(other),
        })?, rule)?),
        PixelType::Float => PixelData::F32(stack(typed(blocks, wrong_type, |b| match b {
            RawBlock::F32(a) => Ok(a),
            other => Err(other),
        })?, rule)?),
    };
    Ok(pixels)
}

fn typed<T>(
    blocks: Vec<RawBlock>,
    wrong_type: impl Fn(&RawBlock) -> Error,
    extract: impl Fn(RawBlock) -> Result<ArrayD<T>, RawBlock>,
) -> Result<Vec<ArrayD<T>>> {
    blocks
        .into_iter()
        .map(|b| extract(b).map_err(|b| wrong_type(&b)))
        .collect()
}

/// `(z, y, x)` of one block under a shape rule.
fn block_shape(shape: &[usize], rule: DataShape) -> Option<[usize; 3]> {
    match (rule, shape) {
        (DataShape::Volume, &[z, y, x]) => Some([z, y, x]),
        (DataShape::Plane, &[y, x]) => Some([1, y, x]),
        _ => None,
    }
}

/// Copies each block once into the output buffer and drops it afterwards.
fn stack<T: Clone>(blocks: Vec<ArrayD<T>>, rule: DataShape) -> Result<Array5<T>> {
    let t_len = blocks.len();
    let mut shape: Option<[usize; 3]> = None;
    let mut data = Vec::new();
    for (t, block) in blocks.into_iter().enumerate() {
        let this = block_shape(block.shape(), rule).ok_or_else(|| {
            Error::ArrayReshape(format!(
                "timestep {t} has shape {:?}, expected {} axes",
                block.shape(),
                if rule == DataShape::Volume { 3 } else { 2 }
            ))
        })?;
        match shape {
            None => {
                shape = Some(this);
                data.reserve(t_len * this.iter().product::<usize>());
            }
            Some(first) if first != this => {
                return Err(Error::ArrayReshape(format!(
                    "timestep {t} has shape {this:?}, timestep 0 has {first:?}"
                )));
            }
            Some(_) => {}
        }
        data.extend(block.iter().cloned());
    }
    let [z, y, x] = shape.unwrap_or_default();
    Array5::from_shape_vec((1, t_len, z, y, x), data)
        .map_err(|e| Error::ArrayReshape(e.to_string()))
}

/// Check that reshaped pixels agree with the declared size attributes.
///
/// Plane offsets are derived from the attributes, so a disagreement would shift
/// every later image in the output file.
pub fn check_geometry(
    pixels: &PixelData,
    geometry: &ImageGeometry,
    modality: Modality,
) -> Result<()> {
    let [_, t, z, y, x] = pixels.shape();
    let declared = [
        geometry.data_count as usize,
        geometry.z_count(modality) as usize,
        geometry.size_y as usize,
        geometry.size_x as usize,
    ];
    if [t, z, y, x] != declared {
        return Err(Error::ArrayReshape(format!(
            "{}: data has (t, z, y, x) = {:?}, attributes declare {declared:?}",
            modality.description(),
            [t, z, y, x]
        )));
    }
    Ok(())
}
