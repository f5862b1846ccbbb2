//! Per-image geometry, plane records and the running plane offset.
use log::warn;

use crate::{
    Error, Result,
    config::{RunConfig, StagePosition, Subsystem, TILING_FILE, TilingInfo},
    container::Container,
    modality::Modality,
    ome::Plane,
};

/// Size and resolution attributes of one modality, as declared in the container.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: Option<u32>,
    /// Number of timesteps.
    pub data_count: u32,
    /// Micrometres per pixel.
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub resolution_z: Option<f64>,
    /// Seconds between timesteps.
    pub time_interval: Option<f64>,
    pub channels: Option<u32>,
    /// Z shift of the fluorescence volume relative to holotomography, micrometres.
    pub offset_z: Option<f64>,
}

impl ImageGeometry {
    /// Read the geometry attributes at `path`, falling back to `parent` for any
    /// attribute `path` does not carry.
    pub fn read(container: &impl Container, path: &str, parent: &str) -> Result<Self> {
        let lookup = |name: &str| -> Result<Option<f64>> {
            if let Some(value) = container.number(path, name)? {
                return Ok(Some(value));
            }
            if parent != path {
                return container.number(parent, name);
            }
            Ok(None)
        };
        let require = |name: &str| -> Result<f64> {
            lookup(name)?.ok_or_else(|| {
                Error::ModalityResolution(format!("{path} has no {name} attribute"))
            })
        };
        let count = |name: &str, value: f64| -> Result<u32> {
            if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX.into()
            {
                Ok(value as u32)
            } else {
                Err(Error::ModalityResolution(format!(
                    "{path}: {name} is not a count: {value}"
                )))
            }
        };
        let geometry = Self {
            size_x: count("SizeX", require("SizeX")?)?,
            size_y: count("SizeY", require("SizeY")?)?,
            size_z: lookup("SizeZ")?.map(|v| count("SizeZ", v)).transpose()?,
            data_count: count("DataCount", require("DataCount")?)?,
            resolution_x: require("ResolutionX")?,
            resolution_y: require("ResolutionY")?,
            resolution_z: lookup("ResolutionZ")?,
            time_interval: lookup("TimeInterval")?,
            channels: lookup("Channels")?
                .map(|v| count("Channels", v))
                .transpose()?,
            offset_z: lookup("OffsetZ")?,
        };
        if let Some(channels) = geometry.channels
            && channels > 1
        {
            warn!("{path} declares {channels} channels, writing it as one");
        }
        Ok(geometry)
    }

    /// Number of z slices written for `modality`.
    pub fn z_count(&self, modality: Modality) -> u32 {
        if modality.collapses_z() {
            1
        } else {
            self.size_z.unwrap_or(1)
        }
    }

    /// Planes of one image: z × t × one channel.
    pub fn plane_count(&self, modality: Modality) -> u32 {
        self.z_count(modality) * self.data_count
    }

    /// Physical z step, only for images that keep their z axis.
    pub fn physical_size_z(&self, modality: Modality) -> Option<f64> {
        if modality.collapses_z() || self.size_z.is_none() {
            return None;
        }
        self.resolution_z
    }

    /// Z extent of the volume in micrometres.
    pub fn z_extent(&self) -> Option<f64> {
        Some(f64::from(self.size_z?) * self.resolution_z?)
    }
}

/// Running index of the first page of the next image in a shared output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneOffsets {
    next: u32,
}

impl PlaneOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next image will start at.
    pub fn next(&self) -> u32 {
        self.next
    }

    /// Reserve `count` planes and return their first offset.
    pub fn advance(&mut self, count: u32) -> u32 {
        let start = self.next;
        self.next += count;
        start
    }

    /// Planes reserved so far.
    pub fn total(&self) -> u32 {
        self.next
    }
}

/// Where the elapsed time of a plane comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSource {
    /// The acquisition is one tile of a timelapse; every plane was taken at
    /// `timestep × size` seconds.
    Tiling { timestep: f64, size: f64 },
    /// `t × interval` seconds; unknown without an interval.
    Interval(Option<f64>),
}

impl TimeSource {
    pub fn new(tiling: Option<&TilingInfo>, geometry: &ImageGeometry) -> Self {
        if let Some(tiling) = tiling {
            if let Some((timestep, size)) = tiling.timing() {
                return Self::Tiling { timestep, size };
            }
            warn!(
                "{} lacks a numeric {} or {}; using TimeInterval",
                TILING_FILE,
                TilingInfo::TIMESTEP,
                TilingInfo::TIMESTEP_SIZE
            );
        }
        Self::Interval(geometry.time_interval)
    }

    /// Elapsed seconds at timestep `t`.
    pub fn delta_t(&self, t: u32) -> Option<f64> {
        match self {
            TimeSource::Tiling { timestep, size } => Some(timestep * size),
            TimeSource::Interval(interval) => interval.map(|i| f64::from(t) * i),
        }
    }
}

/// Exposure of the sub-system that recorded `modality`, in milliseconds.
pub fn exposure(modality: Modality, run: &RunConfig) -> Result<f64> {
    let camera = match modality.subsystem() {
        Subsystem::Holotomography => run.ht_camera()?,
        Subsystem::Brightfield => run.bf_camera()?,
        Subsystem::Fluorescence(n) => run.fluorescence(n)?.camera,
    };
    Ok(camera.exposure)
}

/// One plane per (t, z), z varying fastest.
pub fn build_planes(
    geometry: &ImageGeometry,
    modality: Modality,
    the_c: u32,
    time: TimeSource,
    exposure: Option<f64>,
    position: &StagePosition,
) -> Vec<Plane> {
    let z_count = geometry.z_count(modality);
    (0..geometry.data_count)
        .flat_map(|the_t| {
            (0..z_count).map(move |the_z| Plane {
                the_c,
                the_t,
                the_z,
                delta_t: time.delta_t(the_t),
                exposure_time: exposure,
                position_x: position.x,
                position_y: position.y,
                position_z: position.z,
            })
        })
        .collect()
}
