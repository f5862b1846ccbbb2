use std::fmt::Write as _;

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use super::{
    Channel, Experiment, Experimenter, ExperimenterGroup, Image, Instrument, LightSource,
    MapAnnotation, OME_NAMESPACE, OME_SCHEMA_LOCATION, OmeDocument, Pixels, Project,
};
use crate::Result;

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Serialize a document to OME-XML.
///
/// Non-ASCII characters are written as character references so that the result
/// can be stored in an ASCII TIFF tag.
pub fn to_xml(document: &OmeDocument) -> Result<String> {
    let mut e = Emitter::new();
    e.declaration()?;
    e.start(
        "OME",
        Attrs::default()
            .with("xmlns", OME_NAMESPACE)
            .with("xmlns:xsi", XSI_NAMESPACE)
            .with(
                "xsi:schemaLocation",
                format!("{OME_NAMESPACE} {OME_SCHEMA_LOCATION}"),
            )
            .with("Creator", &document.creator),
    )?;
    for project in &document.projects {
        e.project(project)?;
    }
    for experiment in &document.experiments {
        e.experiment(experiment)?;
    }
    for experimenter in &document.experimenters {
        e.experimenter(experimenter)?;
    }
    for group in &document.experimenter_groups {
        e.experimenter_group(group)?;
    }
    for instrument in &document.instruments {
        e.instrument(instrument)?;
    }
    for image in &document.images {
        e.image(image)?;
    }
    if !document.annotations.is_empty() {
        e.start("StructuredAnnotations", Attrs::default())?;
        for annotation in &document.annotations {
            e.map_annotation(annotation)?;
        }
        e.end("StructuredAnnotations")?;
    }
    e.end("OME")?;
    e.finish()
}

#[derive(Default)]
struct Attrs(Vec<(&'static str, String)>);

impl Attrs {
    fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    fn with_opt<T: ToString>(self, key: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    fn id(id: &str) -> Self {
        Self::default().with("ID", id)
    }
}

struct Emitter {
    writer: Writer<Vec<u8>>,
}

impl Emitter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn finish(self) -> Result<String> {
        let xml = String::from_utf8(self.writer.into_inner()).map_err(crate::Error::wrap)?;
        Ok(ascii_only(xml))
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(crate::Error::wrap)
    }

    fn declaration(&mut self) -> Result<()> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    fn element(name: &str, attrs: &Attrs) -> BytesStart<'static> {
        let mut element = BytesStart::new(name.to_owned());
        for (key, value) in &attrs.0 {
            element.push_attribute((*key, value.as_str()));
        }
        element
    }

    fn start(&mut self, name: &str, attrs: Attrs) -> Result<()> {
        self.emit(Event::Start(Self::element(name, &attrs)))
    }

    fn empty(&mut self, name: &str, attrs: Attrs) -> Result<()> {
        self.emit(Event::Empty(Self::element(name, &attrs)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name, Attrs::default())?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn reference(&mut self, name: &str, id: &str) -> Result<()> {
        self.empty(name, Attrs::id(id))
    }

    fn project(&mut self, p: &Project) -> Result<()> {
        self.start("Project", Attrs::id(&p.id).with("Name", &p.name))?;
        self.text("Description", &p.description)?;
        self.reference("ExperimenterRef", &p.experimenter_ref)?;
        self.reference("ExperimenterGroupRef", &p.experimenter_group_ref)?;
        self.end("Project")
    }

    fn experiment(&mut self, x: &Experiment) -> Result<()> {
        self.start("Experiment", Attrs::id(&x.id).with("Type", "Other"))?;
        self.text("Description", &x.description)?;
        self.reference("ExperimenterRef", &x.experimenter_ref)?;
        self.end("Experiment")
    }

    fn experimenter(&mut self, x: &Experimenter) -> Result<()> {
        self.empty(
            "Experimenter",
            Attrs::id(&x.id)
                .with("FirstName", &x.first_name)
                .with("LastName", &x.last_name)
                .with("Email", &x.email)
                .with("Institution", &x.institution)
                .with("UserName", &x.user_name),
        )
    }

    fn experimenter_group(&mut self, g: &ExperimenterGroup) -> Result<()> {
        self.start("ExperimenterGroup", Attrs::id(&g.id).with("Name", &g.name))?;
        if let Some(description) = &g.description {
            self.text("Description", description)?;
        }
        for id in &g.experimenter_refs {
            self.reference("ExperimenterRef", id)?;
        }
        for id in &g.leader_refs {
            self.reference("Leader", id)?;
        }
        self.end("ExperimenterGroup")
    }

    fn instrument(&mut self, instrument: &Instrument) -> Result<()> {
        self.start("Instrument", Attrs::id(&instrument.id))?;
        let m = &instrument.microscope;
        self.empty(
            "Microscope",
            Attrs::default()
                .with("Manufacturer", &m.manufacturer)
                .with("Model", &m.model)
                .with("SerialNumber", &m.serial_number)
                .with_opt("LotNumber", m.lot_number.as_ref())
                .with("Type", m.kind),
        )?;
        for light_source in &instrument.light_sources {
            match light_source {
                LightSource::Laser(l) => self.empty(
                    "Laser",
                    Attrs::id(&l.id)
                        .with("Power", l.power)
                        .with("PowerUnit", "W")
                        .with("Type", l.kind)
                        .with("Wavelength", l.wavelength)
                        .with("WavelengthUnit", "nm")
                        .with("Tuneable", l.tuneable),
                )?,
                LightSource::Led(l) => self.empty("LightEmittingDiode", Attrs::id(&l.id))?,
            }
        }
        for d in &instrument.detectors {
            self.empty("Detector", Attrs::id(&d.id).with("Type", d.kind))?;
        }
        for o in &instrument.objectives {
            self.empty(
                "Objective",
                Attrs::id(&o.id)
                    .with("Immersion", o.immersion)
                    .with("LensNA", o.lens_na)
                    .with("NominalMagnification", o.nominal_magnification),
            )?;
        }
        self.end("Instrument")
    }

    fn image(&mut self, image: &Image) -> Result<()> {
        self.start("Image", Attrs::id(&image.id).with("Name", &image.name))?;
        if let Some(date) = &image.acquisition_date {
            self.text(
                "AcquisitionDate",
                &date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            )?;
        }
        self.reference("ExperimenterRef", &image.experimenter_ref)?;
        self.text("Description", &image.description)?;
        self.reference("ExperimentRef", &image.experiment_ref)?;
        self.reference("ExperimenterGroupRef", &image.experimenter_group_ref)?;
        self.reference("InstrumentRef", &image.instrument_ref)?;
        if let Some(settings) = &image.objective_settings {
            self.empty(
                "ObjectiveSettings",
                Attrs::id(&settings.id).with_opt("RefractiveIndex", settings.refractive_index),
            )?;
        }
        if let Some(label) = &image.stage_label {
            self.empty(
                "StageLabel",
                Attrs::default()
                    .with("Name", &label.name)
                    .with_opt("X", label.x)
                    .with_opt("Y", label.y)
                    .with_opt("Z", label.z),
            )?;
        }
        self.pixels(&image.pixels)?;
        for id in &image.annotation_refs {
            self.reference("AnnotationRef", id)?;
        }
        self.end("Image")
    }

    fn pixels(&mut self, p: &Pixels) -> Result<()> {
        self.start(
            "Pixels",
            Attrs::id(&p.id)
                .with("DimensionOrder", p.dimension_order)
                .with("Type", p.pixel_type)
                .with("SizeX", p.size_x)
                .with("SizeY", p.size_y)
                .with("SizeZ", p.size_z)
                .with("SizeC", p.size_c)
                .with("SizeT", p.size_t)
                .with_opt("PhysicalSizeX", p.physical_size_x)
                .with_opt("PhysicalSizeY", p.physical_size_y)
                .with_opt("PhysicalSizeZ", p.physical_size_z)
                .with_opt("TimeIncrement", p.time_increment)
                .with("TimeIncrementUnit", "s"),
        )?;
        for channel in &p.channels {
            self.channel(channel)?;
        }
        self.empty(
            "TiffData",
            Attrs::default()
                .with("IFD", p.tiff_data.ifd)
                .with("PlaneCount", p.tiff_data.plane_count),
        )?;
        for plane in &p.planes {
            let has_exposure = plane.exposure_time.is_some();
            self.empty(
                "Plane",
                Attrs::default()
                    .with("TheZ", plane.the_z)
                    .with("TheT", plane.the_t)
                    .with("TheC", plane.the_c)
                    .with_opt("DeltaT", plane.delta_t)
                    .with_opt("DeltaTUnit", plane.delta_t.map(|_| "s"))
                    .with_opt("ExposureTime", plane.exposure_time)
                    .with_opt("ExposureTimeUnit", has_exposure.then_some("ms"))
                    .with("PositionX", plane.position_x)
                    .with("PositionXUnit", "mm")
                    .with("PositionY", plane.position_y)
                    .with("PositionYUnit", "mm")
                    .with("PositionZ", plane.position_z)
                    .with("PositionZUnit", "mm"),
            )?;
        }
        self.end("Pixels")
    }

    fn channel(&mut self, c: &Channel) -> Result<()> {
        self.start(
            "Channel",
            Attrs::id(&c.id)
                .with("Name", &c.name)
                .with("SamplesPerPixel", c.samples_per_pixel)
                .with("IlluminationType", c.illumination_type.as_str())
                .with("AcquisitionMode", c.acquisition_mode.as_str())
                .with("ContrastMethod", c.contrast_method.as_str())
                .with_opt("ExcitationWavelength", c.excitation_wavelength)
                .with_opt(
                    "ExcitationWavelengthUnit",
                    c.excitation_wavelength.map(|_| "nm"),
                )
                .with_opt("EmissionWavelength", c.emission_wavelength)
                .with_opt("EmissionWavelengthUnit", c.emission_wavelength.map(|_| "nm"))
                .with_opt("Fluor", c.fluor.as_ref())
                .with_opt("Color", c.color.map(|color| color.to_ome())),
        )?;
        self.reference("LightSourceSettings", &c.light_source_id)?;
        self.end("Channel")
    }

    fn map_annotation(&mut self, a: &MapAnnotation) -> Result<()> {
        self.start(
            "MapAnnotation",
            Attrs::id(&a.id).with("Namespace", &a.namespace),
        )?;
        self.start("Value", Attrs::default())?;
        for (key, value) in &a.values {
            self.start("M", Attrs::default().with("K", key))?;
            self.emit(Event::Text(BytesText::new(value)))?;
            self.end("M")?;
        }
        self.end("Value")?;
        self.end("MapAnnotation")
    }
}

fn ascii_only(xml: String) -> String {
    if xml.is_ascii() {
        return xml;
    }
    let mut out = String::with_capacity(xml.len() + 16);
    for ch in xml.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let _ = write!(out, "&#x{:X};", u32::from(ch));
        }
    }
    out
}
