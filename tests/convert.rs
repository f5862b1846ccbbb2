mod common;

use std::{fs, fs::File, path::Path};

use common::*;
use ndarray::Array5;
use tcf_ometiff::{
    Error,
    container::MemoryContainer,
    driver::{ConvertOptions, Converter, FolderOutcome, Stage},
    ome::TiffData,
    reshape::PixelData,
    sink::{ImageSink, OmeTiffWriter},
};
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
};

fn opener(container: MemoryContainer) -> impl Fn(&Path) -> tcf_ometiff::Result<MemoryContainer> {
    move |path: &Path| {
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("TCF"));
        Ok(container.clone())
    }
}

fn scenario() -> MemoryContainer {
    let mut c = MemoryContainer::new();
    add_ht3d(&mut c, 10, 1);
    add_ht_mip(&mut c, 2);
    c
}

fn page_count(decoder: &mut Decoder<File>) -> usize {
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages += 1;
    }
    pages
}

#[test]
fn holotomography_volume_and_projection() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    let options = ConvertOptions {
        output_xml: true,
        ..Default::default()
    };
    let mut converter = Converter::new(opener(scenario()), OmeTiffWriter::new(), options);
    let report = converter.convert_folder(&folder, &basic_config()).unwrap();

    let images = &report.document.images;
    assert_eq!(images.len(), 2);
    assert_eq!(
        images[0].pixels.tiff_data,
        TiffData {
            ifd: 0,
            plane_count: 10
        }
    );
    assert_eq!(
        images[1].pixels.tiff_data,
        TiffData {
            ifd: 10,
            plane_count: 2
        }
    );
    assert_eq!(images[1].pixels.size_z, 1);
    assert_eq!(images[1].pixels.physical_size_z, None);
    assert_eq!(report.plane_count, 12);
    assert_eq!(report.document.instruments.len(), 1);
    assert!(images.iter().all(|i| i.instrument_ref == "Instrument:0"));
    assert!(images[0].acquisition_date.is_some());
    assert!(images[1].acquisition_date.is_none());

    assert_eq!(report.tiff_path, folder.join("cells.ome.tiff"));
    assert!(!folder.join("cells.ome.tiff.part").exists());
    let xml_path = report.xml_path.as_ref().unwrap();
    assert_eq!(xml_path, &folder.join("cells.ome.xml"));
    let xml = fs::read_to_string(xml_path).unwrap();
    assert_eq!(xml, report.document.to_xml().unwrap());

    let mut decoder = Decoder::new(File::open(&report.tiff_path).unwrap()).unwrap();
    assert_eq!(
        decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap(),
        xml
    );
    assert_eq!(decoder.dimensions().unwrap(), (SIZE_X as u32, SIZE_Y as u32));
    let DecodingResult::U16(first) = decoder.read_image().unwrap() else {
        panic!("expected 16 bit pages");
    };
    assert_eq!(first[SIZE_X + 1], 11);
    assert_eq!(page_count(&mut decoder), 12);
}

#[test]
fn projections_left_out() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    let options = ConvertOptions {
        include_mip: false,
        ..Default::default()
    };
    let mut converter = Converter::new(opener(scenario()), OmeTiffWriter::new(), options);
    let report = converter.convert_folder(&folder, &basic_config()).unwrap();
    assert_eq!(report.document.images.len(), 1);
    assert_eq!(report.plane_count, 10);
    assert!(report.xml_path.is_none());
    assert!(!folder.join("cells.ome.xml").exists());

    let mut decoder = Decoder::new(File::open(&report.tiff_path).unwrap()).unwrap();
    assert_eq!(page_count(&mut decoder), 10);
}

#[test]
fn missing_run_config_skips_only_that_folder() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let broken = write_folder(dir.path(), "a_broken", None, None);
    let good = write_folder(dir.path(), "b_good", Some(RUN_CONFIG), Some(TILING));
    fs::write(dir.path().join("notes.txt"), "not a folder").unwrap();

    let mut converter = Converter::new(
        opener(scenario()),
        OmeTiffWriter::new(),
        ConvertOptions::default(),
    );
    let report = converter.convert_all(dir.path(), &basic_config()).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.converted(), 1);
    assert_eq!(report.skipped(), 1);

    let FolderOutcome::Skipped {
        folder,
        stage,
        error,
    } = &report.outcomes[0]
    else {
        panic!("broken folder should be skipped");
    };
    assert_eq!(folder, &broken);
    assert_eq!(*stage, Stage::ReadConfigs);
    assert!(matches!(error, Error::ConfigRead { .. }));
    assert!(!broken.join("a_broken.ome.tiff").exists());

    assert_eq!(report.outcomes[0].stage(), Stage::ReadConfigs);
    assert_eq!(report.outcomes[1].stage(), Stage::Done);
    assert_eq!(report.outcomes[1].folder(), good);
    let FolderOutcome::Done(done) = &report.outcomes[1] else {
        panic!("good folder should be converted");
    };
    assert!(done.tiff_path.exists());
    assert!(
        done.document.images[0]
            .annotation_refs
            .contains(&"Annotation:6".to_owned())
    );
}

#[test]
fn one_bad_image_aborts_the_folder() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    let mut container = scenario();
    add_fl3d(&mut container, &[3], 2, 1);

    let mut converter = Converter::new(
        opener(container),
        OmeTiffWriter::new(),
        ConvertOptions::default(),
    );
    let err = converter
        .convert_folder(&folder, &basic_config())
        .unwrap_err();
    let Error::MetadataAssembly { folder: name, source } = err else {
        panic!("expected a metadata assembly error");
    };
    assert_eq!(name, "cells");
    assert!(matches!(*source, Error::UnsupportedFluorescenceChannel(3)));
    assert!(!folder.join("cells.ome.tiff").exists());
}

#[test]
fn declared_sizes_must_match_data() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    let mut container = scenario();
    container.attr("Data/2DMIP", "DataCount", 5u32);

    let mut converter = Converter::new(
        opener(container),
        OmeTiffWriter::new(),
        ConvertOptions::default(),
    );
    let err = converter
        .convert_folder(&folder, &basic_config())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MetadataAssembly { ref source, .. } if matches!(**source, Error::ArrayReshape(_))
    ));
}

#[test]
fn container_without_known_groups() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    let mut container = MemoryContainer::new();
    container.group("Data/Thumbnail");

    let mut converter = Converter::new(
        opener(container),
        OmeTiffWriter::new(),
        ConvertOptions::default(),
    );
    assert!(matches!(
        converter.convert_folder(&folder, &basic_config()),
        Err(Error::ModalityResolution(_))
    ));
}

#[test]
fn unwritable_xml_leaves_no_tiff() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let folder = write_folder(dir.path(), "cells", Some(RUN_CONFIG), None);
    fs::create_dir(folder.join("cells.ome.xml")).unwrap();

    let options = ConvertOptions {
        output_xml: true,
        ..Default::default()
    };
    let mut converter = Converter::new(opener(scenario()), OmeTiffWriter::new(), options);
    let report = converter.convert_all(dir.path(), &basic_config()).unwrap();
    assert_eq!(report.skipped(), 1);
    let FolderOutcome::Skipped { stage, error, .. } = &report.outcomes[0] else {
        panic!("folder should be skipped");
    };
    assert_eq!(*stage, Stage::WriteOutputs);
    assert!(matches!(error, Error::SinkWrite { path, .. } if path == &folder.join("cells.ome.xml")));

    assert!(!folder.join("cells.ome.tiff").exists());
    assert!(!folder.join("cells.ome.tiff.part").exists());
    assert!(!folder.join("cells.ome.xml.part").exists());
    assert!(folder.join("cells.ome.xml").is_dir());
}

#[test]
fn failed_write_leaves_nothing() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.ome.tiff");
    let pixels = PixelData::U8(Array5::zeros((1, 1, 2, 3, 4)));
    let err = OmeTiffWriter::new()
        .write(&path, &[pixels], "<OME/>")
        .unwrap_err();
    assert!(matches!(err, Error::SinkWrite { path: ref p, .. } if p == &path));
    assert!(!path.exists());
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn bigtiff_output() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.ome.tiff");
    let phase = PixelData::F32(Array5::from_elem((1, 2, 1, 3, 4), 0.25));
    let brightfield = PixelData::U8(Array5::from_elem((1, 1, 1, 3, 4), 7));
    OmeTiffWriter::new()
        .with_bigtiff_threshold(0)
        .write(&path, &[phase, brightfield], "<OME/>")
        .unwrap();

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(
        decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap(),
        "<OME/>"
    );
    let DecodingResult::F32(first) = decoder.read_image().unwrap() else {
        panic!("expected float pages");
    };
    assert!(first.iter().all(|v| *v == 0.25));
    decoder.next_image().unwrap();
    decoder.next_image().unwrap();
    let DecodingResult::U8(last) = decoder.read_image().unwrap() else {
        panic!("expected 8 bit page");
    };
    assert_eq!(last, vec![7; 12]);
    assert!(!decoder.more_images());
}
