//! Cross-linking the objects of one acquisition into an [OmeDocument].
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};

use crate::{
    Result,
    builders::{self, AnnotationKind},
    config::{AcquisitionConfig, BasicConfig},
    container::Container,
    modality::PlanEntry,
    ome::{
        Experiment, Experimenter, ExperimenterGroup, Image, Instrument, MapAnnotation,
        ObjectiveSettings, OmeDocument, Pixels, Project, TiffData,
    },
    planes::{self, ImageGeometry, PlaneOffsets, TimeSource},
};

pub const CREATOR: &str = concat!("tcf_ometiff v", env!("CARGO_PKG_VERSION"));
pub const DIMENSION_ORDER: &str = "XYZTC";

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y.%m.%d %H:%M:%S%.f", "%Y%m%d%H%M%S"];

/// Objects shared by every image of one acquisition folder.
#[derive(Debug, Clone)]
pub struct FolderMetadata<'a> {
    pub basic: &'a BasicConfig,
    pub acquisition: &'a AcquisitionConfig,
    pub instrument: Instrument,
    pub experimenter: Experimenter,
    pub experimenter_group: ExperimenterGroup,
    pub experiment: Experiment,
    pub project: Project,
    pub annotations: Vec<MapAnnotation>,
}

impl<'a> FolderMetadata<'a> {
    pub fn new(basic: &'a BasicConfig, acquisition: &'a AcquisitionConfig) -> Result<Self> {
        Ok(Self {
            basic,
            acquisition,
            instrument: builders::instrument(basic, &acquisition.run),
            experimenter: builders::experimenter(basic),
            experimenter_group: builders::experimenter_group(basic),
            experiment: builders::experiment(basic),
            project: builders::project(basic),
            annotations: builders::annotations(basic, acquisition)?,
        })
    }

    /// Annotations an image of `entry` refers to: overall, its sub-system and tiling,
    /// as far as they exist.
    pub fn annotation_refs(&self, entry: &PlanEntry) -> Vec<String> {
        [
            AnnotationKind::Overall,
            AnnotationKind::for_subsystem(entry.modality.subsystem()),
            AnnotationKind::Tiling,
        ]
        .iter()
        .map(AnnotationKind::id)
        .filter(|id| self.annotations.iter().any(|a| &a.id == id))
        .collect()
    }

    fn refractive_index(&self) -> Option<f64> {
        let value = self.acquisition.run.immersion_ri.as_deref()?;
        match value.trim().parse() {
            Ok(ri) => Some(ri),
            Err(_) => {
                warn!("Ignoring non-numeric Immersion_RI {value:?}");
                None
            }
        }
    }
}

/// Builds the images of one folder in emission order.
///
/// Image, pixels and channel ids are `Image:{k}`, `Pixels:{k}` and `Channel:{k}`
/// where `k` counts the images pushed so far.
#[derive(Debug)]
pub struct DocumentAssembler<'a> {
    folder: FolderMetadata<'a>,
    images: Vec<Image>,
    offsets: PlaneOffsets,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(folder: FolderMetadata<'a>) -> Self {
        Self {
            folder,
            images: Vec::new(),
            offsets: PlaneOffsets::new(),
        }
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn offsets(&self) -> PlaneOffsets {
        self.offsets
    }

    /// Add the image of one plan entry; the plane offset only advances on success.
    pub fn push_image(
        &mut self,
        entry: &PlanEntry,
        geometry: &ImageGeometry,
        recorded: Option<DateTime<Utc>>,
    ) -> Result<&Image> {
        let folder = &self.folder;
        let basic = folder.basic;
        let acquisition = folder.acquisition;
        let modality = entry.modality;
        let k = self.images.len();
        let index = u32::try_from(k).map_err(crate::Error::wrap)?;

        let channel = builders::channel_for(
            modality,
            format!("Channel:{k}"),
            basic,
            &acquisition.run,
        )?;
        let exposure = planes::exposure(modality, &acquisition.run)?;
        let time = TimeSource::new(acquisition.tiling.as_ref(), geometry);
        let plane_list = planes::build_planes(
            geometry,
            modality,
            index,
            time,
            Some(exposure),
            &acquisition.position,
        );
        let plane_count = geometry.plane_count(modality);

        let stage_label = if modality.has_stage_label() {
            let label = builders::stage_label(geometry.offset_z, geometry.z_extent());
            if label.is_none() {
                warn!(
                    "{} lacks OffsetZ, SizeZ or ResolutionZ; no stage label written",
                    entry.data_path
                );
            }
            label
        } else {
            None
        };

        let description = modality.description();
        let image = Image {
            id: format!("Image:{k}"),
            name: description.clone(),
            description,
            acquisition_date: recorded,
            experimenter_ref: folder.experimenter.id.clone(),
            experiment_ref: folder.experiment.id.clone(),
            experimenter_group_ref: folder.experimenter_group.id.clone(),
            instrument_ref: folder.instrument.id.clone(),
            objective_settings: Some(ObjectiveSettings {
                id: basic.obj_id.clone(),
                refractive_index: folder.refractive_index(),
            }),
            stage_label,
            pixels: Pixels {
                id: format!("Pixels:{k}"),
                dimension_order: DIMENSION_ORDER,
                pixel_type: modality.pixel_type(),
                size_x: geometry.size_x,
                size_y: geometry.size_y,
                size_z: geometry.z_count(modality),
                size_c: 1,
                size_t: geometry.data_count,
                physical_size_x: Some(builders::round2(geometry.resolution_x)),
                physical_size_y: Some(builders::round2(geometry.resolution_y)),
                physical_size_z: geometry.physical_size_z(modality).map(builders::round2),
                time_increment: geometry.time_interval,
                channels: vec![channel],
                tiff_data: TiffData {
                    ifd: self.offsets.next(),
                    plane_count,
                },
                planes: plane_list,
            },
            annotation_refs: folder.annotation_refs(entry),
        };

        let start = self.offsets.advance(plane_count);
        debug!(
            "{} covers planes {start}..{}",
            image.id,
            self.offsets.next()
        );
        self.images.push(image);
        Ok(&self.images[k])
    }

    pub fn finish(self) -> OmeDocument {
        let folder = self.folder;
        OmeDocument {
            creator: CREATOR.to_owned(),
            projects: vec![folder.project],
            experiments: vec![folder.experiment],
            experimenters: vec![folder.experimenter],
            experimenter_groups: vec![folder.experimenter_group],
            instruments: vec![folder.instrument],
            images: self.images,
            annotations: folder.annotations,
        }
    }
}

/// Parse a `RecordingTime` attribute; timestamps without an offset are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Recording time of the first dataset of a plan entry.
pub fn recording_time(
    container: &impl Container,
    entry: &PlanEntry,
) -> Result<Option<DateTime<Utc>>> {
    let Some(first) = container.members(&entry.data_path)?.into_iter().next() else {
        return Ok(None);
    };
    let path = format!("{}/{first}", entry.data_path);
    let Some(attr) = container.attribute(&path, "RecordingTime")? else {
        debug!("{path} has no RecordingTime");
        return Ok(None);
    };
    let Some(text) = attr.as_str() else {
        warn!("RecordingTime of {path} is not a string");
        return Ok(None);
    };
    let parsed = parse_timestamp(text);
    if parsed.is_none() {
        warn!("Could not parse RecordingTime {text:?} of {path}");
    }
    Ok(parsed)
}
