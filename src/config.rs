//! Readers for the textual metadata files that accompany a TCF acquisition.
//!
//! Every file is first read into a flat [KeyValues] map and then turned into a typed
//! record which fails with the specific missing key instead of at first use.
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const RUN_CONFIG_FILE: &str = "config.dat";
pub const JOB_PARAMETER_FILE: &str = "JobParameter.tcp";
pub const POSITION_FILE: &str = "position.txt";
pub const TILING_FILE: &str = "tiling_info.txt";

pub type KeyValues = BTreeMap<String, String>;

/// Line layout of a key/value file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValueFormat {
    pub delimiter: char,
    /// Discard the first line.
    pub skip_header: bool,
    /// A key which some producers write without its delimiter.
    pub missing_delimiter_key: Option<&'static str>,
}

impl KeyValueFormat {
    /// `key,value` lines, used by the user-supplied project file and the tiling file.
    pub const COMMA: Self = Self {
        delimiter: ',',
        skip_header: false,
        missing_delimiter_key: None,
    };
    /// `config.dat`; the acquisition software drops the comma after `Immersion_RI`.
    pub const RUN_CONFIG: Self = Self {
        delimiter: ',',
        skip_header: false,
        missing_delimiter_key: Some("Immersion_RI"),
    };
    /// `JobParameter.tcp`; the first line is a section header.
    pub const JOB_PARAMETERS: Self = Self {
        delimiter: '=',
        skip_header: true,
        missing_delimiter_key: None,
    };
}

/// Read a key/value file.
///
/// Fails if the file cannot be read or if not a single line could be parsed.
pub fn read_key_values(path: impl AsRef<Path>, format: KeyValueFormat) -> Result<KeyValues> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::config_read(path, e))?;
    let entries = parse_key_values(&text, format);
    if entries.is_empty() {
        return Err(Error::config_read(path, "no key/value lines found"));
    }
    debug!("read {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse key/value text; blank lines and lines without the delimiter are ignored.
pub fn parse_key_values(text: &str, format: KeyValueFormat) -> KeyValues {
    let mut entries = KeyValues::new();
    let skip = usize::from(format.skip_header);
    for line in text.lines().skip(skip) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line = repair_line(line, format);
        match line.split_once(format.delimiter) {
            Some((key, value)) => {
                entries.insert(key.trim().to_owned(), value.trim().to_owned());
            }
            None => debug!("ignoring line without {:?}: {line:?}", format.delimiter),
        }
    }
    entries
}

fn repair_line(line: &str, format: KeyValueFormat) -> Cow<'_, str> {
    if let Some(key) = format.missing_delimiter_key
        && let Some(rest) = line.strip_prefix(key)
        && !rest.starts_with(format.delimiter)
    {
        return Cow::Owned(format!("{key}{}{rest}", format.delimiter));
    }
    Cow::Borrowed(line)
}

fn required<'a>(entries: &'a KeyValues, file: &'static str, key: &str) -> Result<&'a str> {
    entries
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MissingKey {
            file,
            key: key.to_owned(),
        })
}

fn parse_number(file: &'static str, key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| Error::InvalidValue {
        file,
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn required_number(entries: &KeyValues, file: &'static str, key: &str) -> Result<f64> {
    parse_number(file, key, required(entries, file, key)?)
}

/// Project-wide metadata supplied by the user, shared by every folder of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(rename = "exper_id")]
    pub experimenter_id: String,
    #[serde(rename = "exper_email")]
    pub experimenter_email: String,
    #[serde(rename = "exper_inst")]
    pub experimenter_institution: String,
    #[serde(rename = "exper_firstn")]
    pub experimenter_first_name: String,
    #[serde(rename = "exper_lastn")]
    pub experimenter_last_name: String,
    #[serde(rename = "exper_usern")]
    pub experimenter_user_name: String,
    #[serde(rename = "exper_group_id", default = "default_group_id")]
    pub group_id: String,
    #[serde(rename = "exper_group_name", default)]
    pub group_name: Option<String>,
    #[serde(rename = "exper_group_desc", default)]
    pub group_description: Option<String>,
    #[serde(rename = "exp_id", default = "default_experiment_id")]
    pub experiment_id: String,
    #[serde(rename = "exp_desc")]
    pub experiment_description: String,
    #[serde(rename = "proj_id")]
    pub project_id: String,
    #[serde(rename = "proj_name")]
    pub project_name: String,
    #[serde(rename = "proj_desc")]
    pub project_description: String,
    pub mic_id: String,
    #[serde(default)]
    pub lot: Option<String>,
    pub det_id: String,
    pub obj_id: String,
    /// Identifier of the holotomography laser.
    pub light_source_id: String,
    #[serde(rename = "light_source_id_bf", default = "default_bf_light_source")]
    pub brightfield_light_source_id: String,
    #[serde(rename = "light_source_id_fl", default = "default_fl_light_source")]
    pub fluorescence_light_source_id: String,
    #[serde(rename = "instr_id")]
    pub instrument_id: String,
}

fn default_group_id() -> String {
    "ExperimenterGroup:0".into()
}

fn default_experiment_id() -> String {
    "Experiment:0".into()
}

fn default_bf_light_source() -> String {
    "LightSource:BF".into()
}

fn default_fl_light_source() -> String {
    "LightSource:FL".into()
}

impl BasicConfig {
    pub const FILE: &'static str = "basic config";
    pub const REQUIRED: [&'static str; 15] = [
        "exper_id",
        "exper_email",
        "exper_inst",
        "exper_firstn",
        "exper_lastn",
        "exper_usern",
        "exp_desc",
        "proj_id",
        "proj_name",
        "proj_desc",
        "mic_id",
        "det_id",
        "obj_id",
        "light_source_id",
        "instr_id",
    ];

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading overall config from {}", path.display());
        Self::from_map(read_key_values(path, KeyValueFormat::COMMA)?)
    }

    pub fn from_map(entries: KeyValues) -> Result<Self> {
        for key in Self::REQUIRED {
            if entries.get(key).is_none_or(|v| v.is_empty()) {
                return Err(Error::MissingKey {
                    file: Self::FILE,
                    key: key.to_owned(),
                });
            }
        }
        let object = entries
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    /// Group name, falling back to the institution.
    pub fn group_name(&self) -> &str {
        self.group_name
            .as_deref()
            .unwrap_or(&self.experimenter_institution)
    }
}

/// Camera settings of one sub-system, kept as written by the acquisition software.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub shutter: String,
    pub gain: String,
    /// `shutter` as a number; milliseconds.
    pub exposure: f64,
}

impl CameraSettings {
    fn from_entries(entries: &KeyValues, shutter_key: &str, gain_key: &str) -> Result<Self> {
        let shutter = required(entries, RunConfig::FILE, shutter_key)?;
        let gain = required(entries, RunConfig::FILE, gain_key)?;
        Ok(Self {
            exposure: parse_number(RunConfig::FILE, shutter_key, shutter)?,
            shutter: shutter.to_owned(),
            gain: gain.to_owned(),
        })
    }
}

/// Per-sub-channel fluorescence settings from `config.dat`.
#[derive(Debug, Clone, PartialEq)]
pub struct FluorescenceSettings {
    pub index: u8,
    pub emission: String,
    pub fluorophore: String,
    pub camera: CameraSettings,
}

impl FluorescenceSettings {
    pub fn emission_wavelength(&self) -> Result<f64> {
        parse_number(
            RunConfig::FILE,
            &format!("FLCH{}_Fluorophore_Emission", self.index),
            &self.emission,
        )
    }

    /// `config.dat` keys reported for sub-channel `index`, in order.
    pub fn annotation_keys(index: u8) -> [String; 4] {
        ["Fluorophore_Emission", "Fluorophore_Name", "Camera_Shutter", "Camera_Gain"]
            .map(|suffix| format!("FLCH{index}_{suffix}"))
    }
}

/// An optical sub-system whose presence is switched by a count in `config.dat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Holotomography,
    Brightfield,
    Fluorescence(u8),
}

impl Subsystem {
    pub fn count_key(&self) -> String {
        match self {
            Subsystem::Holotomography => "HT_Count".into(),
            Subsystem::Brightfield => "BF_Count".into(),
            Subsystem::Fluorescence(n) => format!("FLCH{n}_Count"),
        }
    }
}

/// Per-run optical and camera parameters written by the acquisition software.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub serial: String,
    pub numerical_aperture: f64,
    pub magnification: f64,
    pub immersion_ri: Option<String>,
    pub entries: KeyValues,
}

impl RunConfig {
    pub const FILE: &'static str = RUN_CONFIG_FILE;

    pub fn read(folder: impl AsRef<Path>) -> Result<Self> {
        let path = folder.as_ref().join(Self::FILE);
        Self::from_map(read_key_values(path, KeyValueFormat::RUN_CONFIG)?)
    }

    pub fn from_map(entries: KeyValues) -> Result<Self> {
        Ok(Self {
            serial: required(&entries, Self::FILE, "Serial")?.to_owned(),
            numerical_aperture: required_number(&entries, Self::FILE, "NA")?,
            magnification: required_number(&entries, Self::FILE, "M")?,
            immersion_ri: entries.get("Immersion_RI").cloned(),
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Result<&str> {
        required(&self.entries, Self::FILE, key)
    }

    pub fn ht_camera(&self) -> Result<CameraSettings> {
        CameraSettings::from_entries(&self.entries, "Camera_Shutter", "Camera_Gain")
    }

    pub fn bf_camera(&self) -> Result<CameraSettings> {
        CameraSettings::from_entries(&self.entries, "BF_Camera_Shutter", "BF_Camera_Gain")
    }

    pub fn fluorescence(&self, index: u8) -> Result<FluorescenceSettings> {
        let key = |suffix: &str| format!("FLCH{index}_{suffix}");
        Ok(FluorescenceSettings {
            index,
            emission: self.get(&key("Fluorophore_Emission"))?.to_owned(),
            fluorophore: self.get(&key("Fluorophore_Name"))?.to_owned(),
            camera: CameraSettings::from_entries(
                &self.entries,
                &key("Camera_Shutter"),
                &key("Camera_Gain"),
            )?,
        })
    }

    /// Whether a sub-system took images.
    ///
    /// The count may be an integer or a boolean; files written before the count
    /// existed count as enabled.
    pub fn is_enabled(&self, subsystem: Subsystem) -> Result<bool> {
        let key = subsystem.count_key();
        let Some(value) = self.entries.get(&key) else {
            return Ok(true);
        };
        if let Ok(count) = value.parse::<i64>() {
            return Ok(count > 0);
        }
        match value.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::InvalidValue {
                file: Self::FILE,
                key,
                value: value.clone(),
            }),
        }
    }
}

/// Job metadata from `JobParameter.tcp`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobParameters {
    pub title: Option<String>,
    pub entries: KeyValues,
}

impl JobParameters {
    pub fn read(folder: impl AsRef<Path>) -> Result<Self> {
        let path = folder.as_ref().join(JOB_PARAMETER_FILE);
        Ok(Self::from_map(read_key_values(
            path,
            KeyValueFormat::JOB_PARAMETERS,
        )?))
    }

    pub fn from_map(entries: KeyValues) -> Self {
        Self {
            title: entries.get("Title").cloned(),
            entries,
        }
    }
}

/// Stage coordinates from `position.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub c: f64,
}

impl StagePosition {
    pub fn read(folder: impl AsRef<Path>) -> Result<Self> {
        let path = folder.as_ref().join(POSITION_FILE);
        let text = fs::read_to_string(&path).map_err(|e| Error::config_read(&path, e))?;
        Self::parse(&text).map_err(|reason| Error::config_read(&path, reason))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<f64>().map_err(|_| format!("not a number: {l:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        let &[x, y, z, c] = values.as_slice() else {
            return Err(format!("expected 4 values, found {}", values.len()));
        };
        Ok(Self { x, y, z, c })
    }
}

/// Mosaic / timelapse placement of an acquisition from `tiling_info.txt`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TilingInfo {
    #[serde(flatten)]
    pub entries: serde_json::Map<String, serde_json::Value>,
}

impl TilingInfo {
    pub const TIMESTEP: &'static str = "tile_timestep";
    pub const TIMESTEP_SIZE: &'static str = "tile_timestep_size";

    /// Read the tiling file of a folder; a missing file is not an error.
    pub fn read(folder: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = folder.as_ref().join(TILING_FILE);
        if !path.is_file() {
            info!("No tiling info in {}", folder.as_ref().display());
            return Ok(None);
        }
        Ok(Some(Self::from_map(read_key_values(
            path,
            KeyValueFormat::COMMA,
        )?)))
    }

    pub fn from_map(entries: KeyValues) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| {
                    let value = coerce(&v);
                    (k, value)
                })
                .collect(),
        }
    }

    /// Tile timestep index and duration, if both are numeric.
    pub fn timing(&self) -> Option<(f64, f64)> {
        let timestep = self.entries.get(Self::TIMESTEP)?.as_f64()?;
        let size = self.entries.get(Self::TIMESTEP_SIZE)?.as_f64()?;
        Some((timestep, size))
    }
}

/// Integer, then float, else the string itself.
fn coerce(value: &str) -> serde_json::Value {
    if let Ok(i) = value.parse::<i64>() {
        return i.into();
    }
    if let Ok(f) = value.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return serde_json::Value::Number(n);
    }
    serde_json::Value::String(value.to_owned())
}

/// Everything read from one acquisition folder.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub folder: PathBuf,
    pub run: RunConfig,
    pub job: JobParameters,
    pub position: StagePosition,
    pub tiling: Option<TilingInfo>,
}

impl AcquisitionConfig {
    pub fn read(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref();
        Ok(Self {
            folder: folder.to_owned(),
            run: RunConfig::read(folder)?,
            job: JobParameters::read(folder)?,
            position: StagePosition::read(folder)?,
            tiling: TilingInfo::read(folder)?,
        })
    }
}
