//! Read-only access to a hierarchical TCF container.
//!
//! The converter only needs to list group members, read scalar attributes and read
//! whole datasets, so that is all [Container] exposes. [MemoryContainer] holds a
//! container in memory; with the `hdf5` feature, `Hdf5Container` reads TCF files.
use std::{collections::BTreeMap, path::Path};

use ndarray::ArrayD;

use crate::{Error, Result, ome::PixelType};

#[cfg(feature = "hdf5")]
mod h5;

#[cfg(feature = "hdf5")]
pub use h5::Hdf5Container;

/// Name of the group holding every modality of an acquisition.
pub const DATA_ROOT: &str = "Data";

/// Scalar attribute value; TCF attributes are one-element arrays of numbers or strings.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Number(_) => None,
            AttrValue::Text(s) => Some(s),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One dataset as stored, in any of the element types a TCF file uses.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBlock {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    F32(ArrayD<f32>),
}

macro_rules! impl_block_from {
    ($t:ty, $variant:ident) => {
        impl From<ArrayD<$t>> for RawBlock {
            fn from(value: ArrayD<$t>) -> Self {
                RawBlock::$variant(value)
            }
        }
    };
}

impl_block_from!(u8, U8);
impl_block_from!(u16, U16);
impl_block_from!(f32, F32);

impl RawBlock {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            RawBlock::U8(_) => PixelType::Uint8,
            RawBlock::U16(_) => PixelType::Uint16,
            RawBlock::F32(_) => PixelType::Float,
        }
    }
}

/// Read access to a container; paths are `/`-separated and relative to the root.
pub trait Container {
    /// Names of the members of the group at `path`, in container order.
    fn members(&self, path: &str) -> Result<Vec<String>>;

    /// A scalar attribute of the group or dataset at `path`, if it exists.
    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>>;

    /// The full contents of the dataset at `path`.
    fn read_block(&self, path: &str) -> Result<RawBlock>;

    fn number(&self, path: &str, name: &str) -> Result<Option<f64>> {
        match self.attribute(path, name)? {
            None => Ok(None),
            Some(AttrValue::Number(n)) => Ok(Some(n)),
            Some(AttrValue::Text(s)) => s.trim().parse().map(Some).map_err(|_| {
                Error::ModalityResolution(format!(
                    "attribute {name} of {path} is not numeric: {s:?}"
                ))
            }),
        }
    }
}

/// Opens the container of one acquisition.
pub trait OpenContainer {
    type Container: Container;

    fn open(&self, path: &Path) -> Result<Self::Container>;
}

impl<C, F> OpenContainer for F
where
    C: Container,
    F: Fn(&Path) -> Result<C>,
{
    type Container = C;

    fn open(&self, path: &Path) -> Result<C> {
        self(path)
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    members: Vec<String>,
    attributes: BTreeMap<String, AttrValue>,
    block: Option<RawBlock>,
}

/// A container held in memory.
///
/// Groups are created on demand, and members keep the order they were added in.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    nodes: BTreeMap<String, Node>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, path: &str) -> &mut Node {
        if !path.is_empty() && !self.nodes.contains_key(path) {
            let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
            self.node_mut(parent).members.push(name.to_owned());
        }
        self.nodes.entry(path.to_owned()).or_default()
    }

    fn node(&self, path: &str) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| Error::ModalityResolution(format!("no such object: {path}")))
    }

    /// Create a group (and its parents).
    pub fn group(&mut self, path: &str) -> &mut Self {
        self.node_mut(path);
        self
    }

    pub fn attr(&mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.node_mut(path)
            .attributes
            .insert(name.to_owned(), value.into());
        self
    }

    pub fn dataset(&mut self, path: &str, block: impl Into<RawBlock>) -> &mut Self {
        self.node_mut(path).block = Some(block.into());
        self
    }
}

impl Container for MemoryContainer {
    fn members(&self, path: &str) -> Result<Vec<String>> {
        let node = self.node(path)?;
        if node.block.is_some() {
            return Err(Error::ModalityResolution(format!(
                "{path} is a dataset, not a group"
            )));
        }
        Ok(node.members.clone())
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        Ok(self.node(path)?.attributes.get(name).cloned())
    }

    fn read_block(&self, path: &str) -> Result<RawBlock> {
        self.node(path)?
            .block
            .clone()
            .ok_or_else(|| Error::ModalityResolution(format!("{path} is not a dataset")))
    }
}
