//! Converting acquisition folders, one at a time.
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use log::{error, info};

use crate::{
    Error, Result,
    assemble::{self, DocumentAssembler, FolderMetadata},
    config::{AcquisitionConfig, BasicConfig},
    container::OpenContainer,
    modality::{self, PlanEntry},
    ome::OmeDocument,
    planes::ImageGeometry,
    reshape::{self, PixelData},
    sink::{self, ImageSink},
};

pub const CONTAINER_SUFFIX: &str = "TCF";
pub const TIFF_SUFFIX: &str = "ome.tiff";
pub const XML_SUFFIX: &str = "ome.xml";

/// Read the project file shared by every folder of a run.
pub fn load_basic_config(path: impl AsRef<Path>) -> Result<BasicConfig> {
    BasicConfig::read(path)
}

/// Steps of converting one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ReadConfigs,
    ResolveModalities,
    BuildImages,
    AssembleDocument,
    WriteOutputs,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReadConfigs => "reading configs",
            Stage::ResolveModalities => "resolving modalities",
            Stage::BuildImages => "building images",
            Stage::AssembleDocument => "assembling metadata",
            Stage::WriteOutputs => "writing outputs",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A folder conversion that failed, with the stage it failed in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Also write the OME-XML next to the OME-TIFF.
    pub output_xml: bool,
    /// Convert maximum intensity projections.
    pub include_mip: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_xml: false,
            include_mip: true,
        }
    }
}

/// Outcome of converting one folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub folder: PathBuf,
    pub tiff_path: PathBuf,
    pub xml_path: Option<PathBuf>,
    pub document: OmeDocument,
    /// Pages written.
    pub plane_count: u32,
}

#[derive(Debug)]
pub enum FolderOutcome {
    Done(ConversionReport),
    Skipped {
        folder: PathBuf,
        stage: Stage,
        error: Error,
    },
}

impl FolderOutcome {
    pub fn folder(&self) -> &Path {
        match self {
            FolderOutcome::Done(report) => &report.folder,
            FolderOutcome::Skipped { folder, .. } => folder,
        }
    }

    /// The stage the folder got to: [Stage::Done], or the one it failed in.
    pub fn stage(&self) -> Stage {
        match self {
            FolderOutcome::Done(_) => Stage::Done,
            FolderOutcome::Skipped { stage, .. } => *stage,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, FolderOutcome::Done(_))
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FolderOutcome>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.converted()
    }
}

/// Converts acquisition folders with a container opener and an image sink.
pub struct Converter<O, S> {
    opener: O,
    sink: S,
    options: ConvertOptions,
}

impl<O: OpenContainer, S: ImageSink> Converter<O, S> {
    pub fn new(opener: O, sink: S, options: ConvertOptions) -> Self {
        Self {
            opener,
            sink,
            options,
        }
    }

    /// Convert the acquisition in `folder`.
    ///
    /// The container is `<folder>/<name>.TCF`; the output is written next to it as
    /// `<name>.ome.tiff` (and `<name>.ome.xml`). Any failure aborts the folder.
    pub fn convert_folder(&mut self, folder: &Path, basic: &BasicConfig) -> Result<ConversionReport> {
        self.run_folder(folder, basic).map_err(|e| e.source)
    }

    fn run_folder(
        &mut self,
        folder: &Path,
        basic: &BasicConfig,
    ) -> std::result::Result<ConversionReport, StageError> {
        let name = folder_name(folder).at(Stage::ReadConfigs)?;
        let acquisition = AcquisitionConfig::read(folder).at(Stage::ReadConfigs)?;

        let container_path = folder.join(format!("{name}.{CONTAINER_SUFFIX}"));
        let (document, images) = {
            let container = self
                .opener
                .open(&container_path)
                .at(Stage::ResolveModalities)?;
            let plan = modality::resolve_container(&container, self.options.include_mip)
                .at(Stage::ResolveModalities)?;
            if plan.is_empty() {
                return Err(Error::ModalityResolution(format!(
                    "{} holds no convertible data",
                    container_path.display()
                )))
                .at(Stage::ResolveModalities);
            }

            let metadata = FolderMetadata::new(basic, &acquisition)
                .map_err(|e| Error::metadata_assembly(&name, e))
                .at(Stage::BuildImages)?;
            let mut assembler = DocumentAssembler::new(metadata);
            let mut images = Vec::with_capacity(plan.len());
            for entry in &plan {
                info!("Working on {}", entry.modality.description());
                let pixels = build_image(&container, &mut assembler, entry)
                    .map_err(|e| Error::metadata_assembly(&name, e))
                    .at(Stage::BuildImages)?;
                images.push(pixels);
            }
            (assembler.finish(), images)
        };

        let xml = document
            .to_xml()
            .map_err(|e| Error::metadata_assembly(&name, e))
            .at(Stage::AssembleDocument)?;

        let (tiff_path, xml_path) = self
            .write_outputs(folder, &name, &images, &xml)
            .at(Stage::WriteOutputs)?;

        let plane_count = document
            .images
            .iter()
            .map(|i| i.pixels.tiff_data.plane_count)
            .sum();
        Ok(ConversionReport {
            folder: folder.to_owned(),
            tiff_path,
            xml_path,
            document,
            plane_count,
        })
    }

    /// Write the OME-TIFF and, if asked for, the OME-XML next to it.
    ///
    /// Either both end up in place or neither does.
    fn write_outputs(
        &mut self,
        folder: &Path,
        name: &str,
        images: &[PixelData],
        xml: &str,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let tiff_path = folder.join(format!("{name}.{TIFF_SUFFIX}"));
        let sidecar = if self.options.output_xml {
            let path = folder.join(format!("{name}.{XML_SUFFIX}"));
            let part = sink::part_path(&path);
            if let Err(e) = fs::write(&part, xml) {
                fs::remove_file(&part).ok();
                return Err(Error::sink_write(&path, e));
            }
            Some((path, part))
        } else {
            None
        };

        if let Err(e) = self.sink.write(&tiff_path, images, xml) {
            if let Some((_, part)) = &sidecar {
                fs::remove_file(part).ok();
            }
            return Err(e);
        }

        let Some((path, part)) = sidecar else {
            return Ok((tiff_path, None));
        };
        info!("Writing file {}", path.display());
        if let Err(e) = fs::rename(&part, &path) {
            fs::remove_file(&part).ok();
            fs::remove_file(&tiff_path).ok();
            return Err(Error::sink_write(&path, e));
        }
        Ok((tiff_path, Some(path)))
    }

    /// Convert every immediate sub-directory of `top`, in name order.
    ///
    /// A folder that fails is logged and skipped; the others are still converted.
    pub fn convert_all(&mut self, top: &Path, basic: &BasicConfig) -> Result<BatchReport> {
        info!("Traversing folders in {}", top.display());
        let mut folders = fs::read_dir(top)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        folders.retain(|path| path.is_dir());
        folders.sort();

        let mut report = BatchReport::default();
        for folder in folders {
            info!("Reading folder {}", folder.display());
            let outcome = match self.run_folder(&folder, basic) {
                Ok(done) => FolderOutcome::Done(done),
                Err(StageError { stage, source }) => {
                    error!("Skipping folder {} while {stage}: {source}", folder.display());
                    FolderOutcome::Skipped {
                        folder,
                        stage,
                        error: source,
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        info!(
            "Converted {} folders, skipped {}",
            report.converted(),
            report.skipped()
        );
        Ok(report)
    }
}

fn folder_name(folder: &Path) -> Result<String> {
    folder
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::general(format!("{} has no usable name", folder.display())))
}

/// Geometry, pixels and metadata of one plan entry.
fn build_image(
    container: &impl crate::container::Container,
    assembler: &mut DocumentAssembler<'_>,
    entry: &PlanEntry,
) -> Result<PixelData> {
    let geometry = ImageGeometry::read(container, &entry.data_path, &entry.group_path)?;
    let pixels = reshape::load(container, entry)?;
    reshape::check_geometry(&pixels, &geometry, entry.modality)?;
    let recorded = assemble::recording_time(container, entry)?;
    assembler.push_image(entry, &geometry, recorded)?;
    Ok(pixels)
}
