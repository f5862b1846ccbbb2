//! The subset of the OME data model written by this crate.
//!
//! Cross references between objects are kept as OME identifiers, the same way they
//! appear in the serialized document.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod xml;

pub use xml::to_xml;

pub const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";
pub const OME_SCHEMA_LOCATION: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd";

/// Pixel type of an image, named as in the OME schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Uint8,
    Uint16,
    Float,
}

impl PixelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::Uint8 => "uint8",
            PixelType::Uint16 => "uint16",
            PixelType::Float => "float",
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            PixelType::Uint8 => 1,
            PixelType::Uint16 => 2,
            PixelType::Float => 4,
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RGBA display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const RED: Self = Self::rgb(255, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// OME stores colours as a signed 32 bit RGBA integer.
    pub fn to_ome(self) -> i32 {
        i32::from_be_bytes([self.r, self.g, self.b, self.a])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Microscope {
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub lot_number: Option<String>,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detector {
    pub id: String,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub id: String,
    pub lens_na: f64,
    pub nominal_magnification: f64,
    pub immersion: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Laser {
    pub id: String,
    /// Watts.
    pub power: f64,
    /// Nanometres.
    pub wavelength: f64,
    pub tuneable: bool,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightEmittingDiode {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightSource {
    Laser(Laser),
    Led(LightEmittingDiode),
}

impl LightSource {
    pub fn id(&self) -> &str {
        match self {
            LightSource::Laser(l) => &l.id,
            LightSource::Led(l) => &l.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub id: String,
    pub microscope: Microscope,
    pub light_sources: Vec<LightSource>,
    pub detectors: Vec<Detector>,
    pub objectives: Vec<Objective>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    WideField,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContrastMethod {
    Brightfield,
    Phase,
    Fluorescence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IlluminationType {
    Transmitted,
    Epifluorescence,
}

impl AcquisitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::WideField => "WideField",
            AcquisitionMode::Other => "Other",
        }
    }
}

impl ContrastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContrastMethod::Brightfield => "Brightfield",
            ContrastMethod::Phase => "Phase",
            ContrastMethod::Fluorescence => "Fluorescence",
        }
    }
}

impl IlluminationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IlluminationType::Transmitted => "Transmitted",
            IlluminationType::Epifluorescence => "Epifluorescence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub acquisition_mode: AcquisitionMode,
    pub contrast_method: ContrastMethod,
    pub illumination_type: IlluminationType,
    pub light_source_id: String,
    pub samples_per_pixel: u32,
    /// Nanometres.
    pub excitation_wavelength: Option<f64>,
    /// Nanometres.
    pub emission_wavelength: Option<f64>,
    pub fluor: Option<String>,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Experimenter {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub institution: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimenterGroup {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub experimenter_refs: Vec<String>,
    pub leader_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub id: String,
    pub description: String,
    pub experimenter_ref: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub experimenter_ref: String,
    pub experimenter_group_ref: String,
}

/// Namespaced key/value annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct MapAnnotation {
    pub id: String,
    pub namespace: String,
    pub values: Vec<(String, String)>,
}

impl MapAnnotation {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub the_c: u32,
    pub the_t: u32,
    pub the_z: u32,
    /// Seconds.
    pub delta_t: Option<f64>,
    /// Milliseconds.
    pub exposure_time: Option<f64>,
    /// Millimetres.
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageLabel {
    pub name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Micrometres.
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffData {
    pub ifd: u32,
    pub plane_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveSettings {
    pub id: String,
    pub refractive_index: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pixels {
    pub id: String,
    pub dimension_order: &'static str,
    pub pixel_type: PixelType,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    /// Micrometres.
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    /// Seconds.
    pub time_increment: Option<f64>,
    pub channels: Vec<Channel>,
    pub tiff_data: TiffData,
    pub planes: Vec<Plane>,
}

impl Pixels {
    pub fn plane_count(&self) -> u32 {
        self.size_z * self.size_t * self.size_c
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub description: String,
    pub acquisition_date: Option<DateTime<Utc>>,
    pub experimenter_ref: String,
    pub experiment_ref: String,
    pub experimenter_group_ref: String,
    pub instrument_ref: String,
    pub objective_settings: Option<ObjectiveSettings>,
    pub stage_label: Option<StageLabel>,
    pub pixels: Pixels,
    pub annotation_refs: Vec<String>,
}

/// Root of an OME metadata document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OmeDocument {
    pub creator: String,
    pub projects: Vec<Project>,
    pub experiments: Vec<Experiment>,
    pub experimenters: Vec<Experimenter>,
    pub experimenter_groups: Vec<ExperimenterGroup>,
    pub instruments: Vec<Instrument>,
    pub images: Vec<Image>,
    pub annotations: Vec<MapAnnotation>,
}

impl OmeDocument {
    pub fn to_xml(&self) -> crate::Result<String> {
        to_xml(self)
    }
}
