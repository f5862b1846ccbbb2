//! Imaging modalities of a TCF acquisition and the traversal plan over them.
use log::{info, warn};

use crate::{
    Result,
    config::Subsystem,
    container::{Container, DATA_ROOT},
    ome::PixelType,
};

/// A top-level group under `Data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModalityGroup {
    Ht3d,
    Ht2dPhase,
    Ht2dMip,
    Brightfield,
    Fl2dMip,
    Fl3d,
    Unknown(String),
}

impl ModalityGroup {
    pub fn parse(name: &str) -> Self {
        match name {
            "3D" => Self::Ht3d,
            "2D" => Self::Ht2dPhase,
            "2DMIP" => Self::Ht2dMip,
            "BF" => Self::Brightfield,
            "2DFLMIP" => Self::Fl2dMip,
            "3DFL" => Self::Fl3d,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub fn is_mip(&self) -> bool {
        matches!(self, Self::Ht2dMip | Self::Fl2dMip)
    }
}

/// How the per-timestep datasets of a modality are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    /// `(z, y, x)` volumes.
    Volume,
    /// `(y, x)` planes; the z axis has size 1.
    Plane,
}

/// The modality of one output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Ht3d,
    Ht2dPhase,
    Ht2dMip,
    Brightfield,
    /// Fluorescence maximum intensity projection of one sub-channel.
    Fl2dMip(u8),
    /// Fluorescence volume of one sub-channel.
    Fl3d(u8),
}

impl Modality {
    pub fn description(&self) -> String {
        match self {
            Modality::Ht3d => "3D Holotomography".into(),
            Modality::Ht2dPhase => "2D Phasemap".into(),
            Modality::Ht2dMip => "2D Holotomography Maximum Intensity Projection".into(),
            Modality::Brightfield => "2D Brightfield".into(),
            Modality::Fl2dMip(n) => {
                format!("2D Fluorescence Maximum Intensity Projection CH{n}")
            }
            Modality::Fl3d(n) => format!("3D Fluorescence CH{n}"),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            Modality::Ht2dPhase => PixelType::Float,
            Modality::Brightfield => PixelType::Uint8,
            Modality::Ht3d | Modality::Ht2dMip | Modality::Fl2dMip(_) | Modality::Fl3d(_) => {
                PixelType::Uint16
            }
        }
    }

    pub fn data_shape(&self) -> DataShape {
        match self {
            Modality::Ht3d | Modality::Fl3d(_) => DataShape::Volume,
            Modality::Ht2dPhase | Modality::Ht2dMip | Modality::Brightfield | Modality::Fl2dMip(_) => {
                DataShape::Plane
            }
        }
    }

    pub fn collapses_z(&self) -> bool {
        self.data_shape() == DataShape::Plane
    }

    /// The optical sub-system that recorded this modality.
    pub fn subsystem(&self) -> Subsystem {
        match self {
            Modality::Ht3d | Modality::Ht2dPhase | Modality::Ht2dMip => Subsystem::Holotomography,
            Modality::Brightfield => Subsystem::Brightfield,
            Modality::Fl2dMip(n) | Modality::Fl3d(n) => Subsystem::Fluorescence(*n),
        }
    }

    pub fn has_stage_label(&self) -> bool {
        matches!(self, Modality::Fl3d(_))
    }
}

/// One output image of the traversal plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub modality: Modality,
    /// Group holding the modality's attributes, e.g. `Data/3DFL`.
    pub group_path: String,
    /// Group holding the per-timestep datasets, e.g. `Data/3DFL/CH0`.
    pub data_path: String,
}

impl PlanEntry {
    fn new(modality: Modality, group: &str, sub_channel: Option<&str>) -> Self {
        let group_path = format!("{DATA_ROOT}/{group}");
        let data_path = match sub_channel {
            Some(sub) => format!("{group_path}/{sub}"),
            None => group_path.clone(),
        };
        Self {
            modality,
            group_path,
            data_path,
        }
    }
}

/// Parse a fluorescence sub-channel group name (`CH0`, `CH1`, ...).
pub fn parse_sub_channel(name: &str) -> Option<u8> {
    name.strip_prefix("CH")?.parse().ok()
}

/// Build the traversal plan from the top-level group names.
///
/// `sub_channels` lists the members of a fluorescence group. Unknown groups and
/// unparseable sub-channels are skipped. With `include_mip` unset, maximum intensity
/// projections are dropped before fluorescence groups are expanded.
pub fn resolve<I, S, F>(names: I, mut sub_channels: F, include_mip: bool) -> Result<Vec<PlanEntry>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(&str) -> Result<Vec<String>>,
{
    let mut plan = Vec::new();
    for name in names {
        let name = name.as_ref();
        let group = ModalityGroup::parse(name);
        if group.is_mip() && !include_mip {
            info!("Leaving out maximum intensity projection {name}");
            continue;
        }
        let flat = match group {
            ModalityGroup::Ht3d => Modality::Ht3d,
            ModalityGroup::Ht2dPhase => Modality::Ht2dPhase,
            ModalityGroup::Ht2dMip => Modality::Ht2dMip,
            ModalityGroup::Brightfield => Modality::Brightfield,
            ModalityGroup::Fl2dMip | ModalityGroup::Fl3d => {
                for sub in sub_channels(name)? {
                    let Some(n) = parse_sub_channel(&sub) else {
                        warn!("Skipping unknown fluorescence channel {name}/{sub}");
                        continue;
                    };
                    let modality = if group == ModalityGroup::Fl3d {
                        Modality::Fl3d(n)
                    } else {
                        Modality::Fl2dMip(n)
                    };
                    plan.push(PlanEntry::new(modality, name, Some(&sub)));
                }
                continue;
            }
            ModalityGroup::Unknown(_) => {
                warn!("Skipping unknown data type {name}");
                continue;
            }
        };
        plan.push(PlanEntry::new(flat, name, None));
    }
    Ok(plan)
}

/// Build the traversal plan of a container's `Data` root.
pub fn resolve_container(container: &impl Container, include_mip: bool) -> Result<Vec<PlanEntry>> {
    let names = container.members(DATA_ROOT)?;
    resolve(
        &names,
        |group| container.members(&format!("{DATA_ROOT}/{group}")),
        include_mip,
    )
}
