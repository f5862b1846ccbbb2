use std::path::{Path, PathBuf};

use hdf5::{
    File, Location,
    types::{FixedAscii, FixedUnicode, FloatSize, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode},
};
use log::info;

use super::{AttrValue, Container, RawBlock};
use crate::{Error, Result};

/// A TCF file opened read-only; the file is closed when this is dropped.
pub struct Hdf5Container {
    path: PathBuf,
    file: File,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Reading image {}", path.display());
        let file = File::open(path).map_err(|e| {
            Error::ModalityResolution(format!("could not open {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_owned(),
            file,
        })
    }

    /// Run `f` on the group or dataset at `path`.
    fn with_location<T>(
        &self,
        path: &str,
        f: impl FnOnce(&Location) -> hdf5::Result<T>,
    ) -> Result<T> {
        let result = if let Ok(group) = self.file.group(path) {
            f(&group)
        } else {
            let dataset = self.file.dataset(path).map_err(|e| self.missing(path, e))?;
            f(&dataset)
        };
        result.map_err(Error::wrap)
    }

    fn missing(&self, path: &str, error: hdf5::Error) -> Error {
        Error::ModalityResolution(format!(
            "{} has no object {path}: {error}",
            self.path.display()
        ))
    }
}

fn read_attribute(location: &Location, name: &str) -> hdf5::Result<Option<AttrValue>> {
    if !location.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    let attr = location.attr(name)?;
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => attr
            .read_raw::<VarLenUnicode>()?
            .first()
            .map(|s| text(s.as_str())),
        TypeDescriptor::VarLenAscii => attr
            .read_raw::<VarLenAscii>()?
            .first()
            .map(|s| text(s.as_str())),
        TypeDescriptor::FixedAscii(_) => attr
            .read_raw::<FixedAscii<1024>>()?
            .first()
            .map(|s| text(s.as_str())),
        TypeDescriptor::FixedUnicode(_) => attr
            .read_raw::<FixedUnicode<1024>>()?
            .first()
            .map(|s| text(s.as_str())),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
            attr.read_raw::<f64>()?.first().copied().map(AttrValue::Number)
        }
        other => {
            return Err(hdf5::Error::from(format!(
                "attribute {name} has unsupported type {other:?}"
            )));
        }
    };
    Ok(value)
}

fn text(s: &str) -> AttrValue {
    AttrValue::Text(s.trim_end_matches('\0').to_owned())
}

impl Container for Hdf5Container {
    fn members(&self, path: &str) -> Result<Vec<String>> {
        let group = self.file.group(path).map_err(|e| self.missing(path, e))?;
        group.member_names().map_err(Error::wrap)
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        self.with_location(path, |location| read_attribute(location, name))
    }

    fn read_block(&self, path: &str) -> Result<RawBlock> {
        let dataset = self.file.dataset(path).map_err(|e| self.missing(path, e))?;
        let descriptor = dataset
            .dtype()
            .and_then(|t| t.to_descriptor())
            .map_err(Error::wrap)?;
        let block = match descriptor {
            TypeDescriptor::Unsigned(IntSize::U1) => dataset.read_dyn::<u8>().map(RawBlock::U8),
            TypeDescriptor::Unsigned(IntSize::U2) => dataset.read_dyn::<u16>().map(RawBlock::U16),
            TypeDescriptor::Float(FloatSize::U4) | TypeDescriptor::Float(FloatSize::U8) => {
                dataset.read_dyn::<f32>().map(RawBlock::F32)
            }
            other => {
                return Err(Error::ArrayReshape(format!(
                    "{path} has unsupported element type {other:?}"
                )));
            }
        };
        block.map_err(Error::wrap)
    }
}
