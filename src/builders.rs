//! Constructors for the OME objects of one acquisition.
//!
//! Everything here is a pure function of the configuration records and a handful
//! of constants describing the HT-2H microscope.
use crate::{
    Error, Result,
    config::{AcquisitionConfig, BasicConfig, FluorescenceSettings, RunConfig, Subsystem},
    modality::Modality,
    ome::{
        AcquisitionMode, Channel, Color, ContrastMethod, Detector, Experiment, Experimenter,
        ExperimenterGroup, IlluminationType, Instrument, Laser, LightEmittingDiode, LightSource,
        MapAnnotation, Microscope, Objective, Project, StageLabel,
    },
};

pub const MANUFACTURER: &str = "Tomocube Inc.";
pub const MODEL: &str = "HT-2H";
pub const MICROSCOPE_TYPE: &str = "Other";
pub const DETECTOR_TYPE: &str = "CCD";
pub const IMMERSION: &str = "Water";
/// Holotomography laser wavelength, nanometres.
pub const HT_WAVELENGTH: f64 = 532.0;
/// Holotomography laser power, watts.
pub const HT_LASER_POWER: f64 = 0.05;
pub const HT_LASER_TYPE: &str = "SolidState";

/// Fluorescence sub-channels the microscope has.
pub const FLUORESCENCE_CHANNELS: u8 = 3;

/// Prefix of every annotation namespace written.
pub const NAMESPACE: &str = "tcf_ometiff";

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn microscope(id: &str, serial: &str, lot: Option<&str>) -> Microscope {
    Microscope {
        id: id.to_owned(),
        manufacturer: MANUFACTURER.to_owned(),
        model: MODEL.to_owned(),
        serial_number: serial.to_owned(),
        lot_number: lot.map(str::to_owned),
        kind: MICROSCOPE_TYPE,
    }
}

pub fn detector(id: &str) -> Detector {
    Detector {
        id: id.to_owned(),
        kind: DETECTOR_TYPE,
    }
}

pub fn objective(id: &str, numerical_aperture: f64, magnification: f64) -> Objective {
    Objective {
        id: id.to_owned(),
        lens_na: numerical_aperture,
        nominal_magnification: magnification,
        immersion: IMMERSION,
    }
}

/// The holotomography source `ht_id` is the fixed 532 nm laser; any other id is an LED.
pub fn light_source(id: &str, ht_id: &str) -> LightSource {
    if id == ht_id {
        LightSource::Laser(Laser {
            id: id.to_owned(),
            power: HT_LASER_POWER,
            wavelength: HT_WAVELENGTH,
            tuneable: false,
            kind: HT_LASER_TYPE,
        })
    } else {
        LightSource::Led(LightEmittingDiode { id: id.to_owned() })
    }
}

pub fn instrument(basic: &BasicConfig, run: &RunConfig) -> Instrument {
    let ht = basic.light_source_id.as_str();
    let mut light_sources = vec![light_source(ht, ht)];
    for id in [
        &basic.brightfield_light_source_id,
        &basic.fluorescence_light_source_id,
    ] {
        if light_sources.iter().all(|l| l.id() != id.as_str()) {
            light_sources.push(light_source(id, ht));
        }
    }
    Instrument {
        id: basic.instrument_id.clone(),
        microscope: microscope(&basic.mic_id, &run.serial, basic.lot.as_deref()),
        light_sources,
        detectors: vec![detector(&basic.det_id)],
        objectives: vec![objective(
            &basic.obj_id,
            run.numerical_aperture,
            run.magnification,
        )],
    }
}

pub fn ht_channel(id: String, light_source_id: &str, name: &str) -> Channel {
    Channel {
        id,
        name: name.to_owned(),
        acquisition_mode: AcquisitionMode::Other,
        contrast_method: ContrastMethod::Phase,
        illumination_type: IlluminationType::Transmitted,
        light_source_id: light_source_id.to_owned(),
        samples_per_pixel: 1,
        excitation_wavelength: None,
        emission_wavelength: None,
        fluor: None,
        color: None,
    }
}

pub fn brightfield_channel(id: String, light_source_id: &str) -> Channel {
    Channel {
        id,
        name: "2D Brightfield".into(),
        acquisition_mode: AcquisitionMode::WideField,
        contrast_method: ContrastMethod::Brightfield,
        illumination_type: IlluminationType::Transmitted,
        light_source_id: light_source_id.to_owned(),
        samples_per_pixel: 1,
        excitation_wavelength: None,
        emission_wavelength: None,
        fluor: None,
        color: None,
    }
}

/// Excitation wavelength (nm) and display colour of a fluorescence sub-channel.
pub fn excitation(index: u8) -> Result<(f64, Color)> {
    match index {
        0 => Ok((385.0, Color::BLUE)),
        1 => Ok((470.0, Color::GREEN)),
        2 => Ok((570.0, Color::RED)),
        n => Err(Error::UnsupportedFluorescenceChannel(n)),
    }
}

pub fn fluorescence_channel(
    id: String,
    light_source_id: &str,
    settings: &FluorescenceSettings,
) -> Result<Channel> {
    let (excitation, color) = excitation(settings.index)?;
    Ok(Channel {
        id,
        name: format!("FL CH{}", settings.index),
        acquisition_mode: AcquisitionMode::WideField,
        contrast_method: ContrastMethod::Fluorescence,
        illumination_type: IlluminationType::Epifluorescence,
        light_source_id: light_source_id.to_owned(),
        samples_per_pixel: 1,
        excitation_wavelength: Some(excitation),
        emission_wavelength: Some(settings.emission_wavelength()?),
        fluor: Some(settings.fluorophore.clone()),
        color: Some(color),
    })
}

/// The channel of an image of `modality`, with its final id.
pub fn channel_for(
    modality: Modality,
    id: String,
    basic: &BasicConfig,
    run: &RunConfig,
) -> Result<Channel> {
    let ht = &basic.light_source_id;
    match modality {
        Modality::Ht3d => Ok(ht_channel(id, ht, "3D HT")),
        Modality::Ht2dPhase => Ok(ht_channel(id, ht, "2D Phase")),
        Modality::Ht2dMip => Ok(ht_channel(id, ht, "2D MIP HT")),
        Modality::Brightfield => Ok(brightfield_channel(
            id,
            &basic.brightfield_light_source_id,
        )),
        Modality::Fl2dMip(n) | Modality::Fl3d(n) => {
            // Checked before the settings so an unknown index is reported as such.
            excitation(n)?;
            fluorescence_channel(id, &basic.fluorescence_light_source_id, &run.fluorescence(n)?)
        }
    }
}

pub fn experimenter(basic: &BasicConfig) -> Experimenter {
    Experimenter {
        id: basic.experimenter_id.clone(),
        first_name: basic.experimenter_first_name.clone(),
        last_name: basic.experimenter_last_name.clone(),
        email: basic.experimenter_email.clone(),
        institution: basic.experimenter_institution.clone(),
        user_name: basic.experimenter_user_name.clone(),
    }
}

pub fn experimenter_group(basic: &BasicConfig) -> ExperimenterGroup {
    ExperimenterGroup {
        id: basic.group_id.clone(),
        name: basic.group_name().to_owned(),
        description: basic.group_description.clone(),
        experimenter_refs: vec![basic.experimenter_id.clone()],
        leader_refs: Vec::new(),
    }
}

pub fn experiment(basic: &BasicConfig) -> Experiment {
    Experiment {
        id: basic.experiment_id.clone(),
        description: basic.experiment_description.clone(),
        experimenter_ref: basic.experimenter_id.clone(),
    }
}

pub fn project(basic: &BasicConfig) -> Project {
    Project {
        id: basic.project_id.clone(),
        name: basic.project_name.clone(),
        description: basic.project_description.clone(),
        experimenter_ref: basic.experimenter_id.clone(),
        experimenter_group_ref: basic.group_id.clone(),
    }
}

/// Z shift of a fluorescence volume relative to the holotomography volume.
///
/// `None` unless the volume declares `OffsetZ`, `SizeZ` and `ResolutionZ`.
pub fn stage_label(offset_z: Option<f64>, z_extent: Option<f64>) -> Option<StageLabel> {
    let shift = offset_z? - z_extent? / 2.0;
    Some(StageLabel {
        name: "Z shift relative to HT".into(),
        x: None,
        y: None,
        z: Some(round2(shift)),
    })
}

/// One of the fixed structured annotations of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Overall,
    Holotomography,
    Brightfield,
    Fluorescence(u8),
    Tiling,
}

impl AnnotationKind {
    pub fn index(&self) -> u8 {
        match self {
            AnnotationKind::Overall => 0,
            AnnotationKind::Holotomography => 1,
            AnnotationKind::Brightfield => 2,
            AnnotationKind::Fluorescence(n) => 3 + n,
            AnnotationKind::Tiling => 6,
        }
    }

    pub fn id(&self) -> String {
        format!("Annotation:{}", self.index())
    }

    pub fn namespace(&self) -> String {
        match self {
            AnnotationKind::Overall => format!("{NAMESPACE}/overall"),
            AnnotationKind::Holotomography => format!("{NAMESPACE}/holotomography"),
            AnnotationKind::Brightfield => format!("{NAMESPACE}/brightfield"),
            AnnotationKind::Fluorescence(n) => format!("{NAMESPACE}/fluorescence/CH{n}"),
            AnnotationKind::Tiling => format!("{NAMESPACE}/tiling"),
        }
    }

    pub fn for_subsystem(subsystem: Subsystem) -> Self {
        match subsystem {
            Subsystem::Holotomography => AnnotationKind::Holotomography,
            Subsystem::Brightfield => AnnotationKind::Brightfield,
            Subsystem::Fluorescence(n) => AnnotationKind::Fluorescence(n),
        }
    }

    fn annotation(self, values: Vec<(String, String)>) -> MapAnnotation {
        MapAnnotation {
            id: self.id(),
            namespace: self.namespace(),
            values,
        }
    }
}

/// Key/value pairs copied from `config.dat`; absent keys are left out.
fn copied(run: &RunConfig, keys: &[&str]) -> Vec<(String, String)> {
    keys.iter()
        .filter_map(|key| {
            run.entries
                .get(*key)
                .map(|value| ((*key).to_owned(), value.clone()))
        })
        .collect()
}

/// The structured annotations of one acquisition, ordered by id.
///
/// Sub-system annotations are only written for enabled sub-systems; the tiling
/// annotation only when a tiling file was found.
pub fn annotations(
    basic: &BasicConfig,
    acquisition: &AcquisitionConfig,
) -> Result<Vec<MapAnnotation>> {
    let run = &acquisition.run;
    let position = &acquisition.position;

    let mut overall = Vec::new();
    if let Some(title) = &acquisition.job.title {
        overall.push(("Title".to_owned(), title.clone()));
    }
    overall.extend(copied(run, &["Serial", "NA", "M", "Immersion_RI"]));
    for (key, value) in [
        ("PositionX", position.x),
        ("PositionY", position.y),
        ("PositionZ", position.z),
        ("PositionC", position.c),
    ] {
        overall.push((key.to_owned(), value.to_string()));
    }
    overall.push(("ProjectID".to_owned(), basic.project_id.clone()));
    overall.push(("ProjectName".to_owned(), basic.project_name.clone()));
    overall.push(("ProjectDescription".to_owned(), basic.project_description.clone()));

    let mut annotations = vec![AnnotationKind::Overall.annotation(overall)];

    if run.is_enabled(Subsystem::Holotomography)? {
        let mut values = copied(run, &["Camera_Shutter", "Camera_Gain"]);
        values.push(("Wavelength".to_owned(), HT_WAVELENGTH.to_string()));
        annotations.push(AnnotationKind::Holotomography.annotation(values));
    }
    if run.is_enabled(Subsystem::Brightfield)? {
        let values = copied(run, &["BF_Camera_Shutter", "BF_Camera_Gain"]);
        annotations.push(AnnotationKind::Brightfield.annotation(values));
    }
    for n in 0..FLUORESCENCE_CHANNELS {
        if !run.is_enabled(Subsystem::Fluorescence(n))? {
            continue;
        }
        let keys = FluorescenceSettings::annotation_keys(n);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut values = copied(run, &keys);
        let (wavelength, _) = excitation(n)?;
        values.push(("ExcitationWavelength".to_owned(), wavelength.to_string()));
        annotations.push(AnnotationKind::Fluorescence(n).annotation(values));
    }
    if let Some(tiling) = &acquisition.tiling {
        let values = tiling
            .entries
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();
        annotations.push(AnnotationKind::Tiling.annotation(values));
    }
    Ok(annotations)
}
