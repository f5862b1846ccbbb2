mod common;

use std::collections::HashMap;

use common::*;
use ndarray::{Array2, Array3};
use tcf_ometiff::{
    Error,
    container::{Container, MemoryContainer, RawBlock},
    modality::{Modality, ModalityGroup, parse_sub_channel, resolve, resolve_container},
    ome::PixelType,
    planes::ImageGeometry,
    reshape::{self, PixelData},
};

fn sub_channels(
    groups: HashMap<&'static str, Vec<&'static str>>,
) -> impl FnMut(&str) -> tcf_ometiff::Result<Vec<String>> {
    move |name: &str| {
        Ok(groups
            .get(name)
            .map(|subs| subs.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default())
    }
}

#[test]
fn group_names() {
    assert_eq!(ModalityGroup::parse("3DFL"), ModalityGroup::Fl3d);
    assert_eq!(ModalityGroup::parse("2D"), ModalityGroup::Ht2dPhase);
    assert_eq!(
        ModalityGroup::parse("3dfl"),
        ModalityGroup::Unknown("3dfl".into())
    );
    assert_eq!(parse_sub_channel("CH2"), Some(2));
    assert_eq!(parse_sub_channel("CHx"), None);
    assert_eq!(parse_sub_channel("2"), None);
}

#[test]
fn fluorescence_groups_expand_in_their_own_order() {
    init();
    let groups = HashMap::from([
        ("3DFL", vec!["CH2", "CH0"]),
        ("2DFLMIP", vec!["CH1", "thumbnail"]),
    ]);
    let plan = resolve(
        ["3D", "3DFL", "Thumbnail", "BF", "2DFLMIP", "2D"],
        sub_channels(groups),
        true,
    )
    .unwrap();
    let modalities: Vec<_> = plan.iter().map(|e| e.modality).collect();
    assert_eq!(
        modalities,
        [
            Modality::Ht3d,
            Modality::Fl3d(2),
            Modality::Fl3d(0),
            Modality::Brightfield,
            Modality::Fl2dMip(1),
            Modality::Ht2dPhase,
        ]
    );
    assert_eq!(plan[1].group_path, "Data/3DFL");
    assert_eq!(plan[1].data_path, "Data/3DFL/CH2");
    assert_eq!(plan[0].group_path, plan[0].data_path);
}

#[test]
fn projections_can_be_left_out() {
    init();
    let plan = resolve(
        ["2DMIP", "3D", "2DFLMIP"],
        |name: &str| -> tcf_ometiff::Result<Vec<String>> {
            panic!("{name} should not be expanded")
        },
        false,
    )
    .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].modality, Modality::Ht3d);
}

#[test]
fn container_plan() {
    init();
    let mut c = MemoryContainer::new();
    add_ht3d(&mut c, 2, 1);
    add_fl3d(&mut c, &[0, 1], 2, 1);
    add_ht_mip(&mut c, 1);
    let plan = resolve_container(&c, true).unwrap();
    let modalities: Vec<_> = plan.iter().map(|e| e.modality).collect();
    assert_eq!(
        modalities,
        [
            Modality::Ht3d,
            Modality::Fl3d(0),
            Modality::Fl3d(1),
            Modality::Ht2dMip
        ]
    );

    let empty = MemoryContainer::new();
    assert!(matches!(
        resolve_container(&empty, true),
        Err(Error::ModalityResolution(_))
    ));
}

#[test]
fn modality_properties() {
    assert_eq!(Modality::Ht2dPhase.pixel_type(), PixelType::Float);
    assert_eq!(Modality::Brightfield.pixel_type(), PixelType::Uint8);
    assert_eq!(Modality::Fl2dMip(0).pixel_type(), PixelType::Uint16);
    assert!(Modality::Ht2dMip.collapses_z());
    assert!(!Modality::Fl3d(1).collapses_z());
    assert_eq!(
        Modality::Fl2dMip(2).description(),
        "2D Fluorescence Maximum Intensity Projection CH2"
    );
    assert!(Modality::Fl3d(0).has_stage_label());
    assert!(!Modality::Ht3d.has_stage_label());
}

#[test]
fn volumes_stack_on_time() {
    init();
    let blocks: Vec<RawBlock> = (0..2u16)
        .map(|t| Array3::from_elem((5, 3, 4), t).into_dyn().into())
        .collect();
    let pixels = reshape::reshape(Modality::Ht3d, blocks).unwrap();
    assert_eq!(pixels.shape(), [1, 2, 5, 3, 4]);
    assert_eq!(pixels.plane_count(), 10);
    let PixelData::U16(array) = pixels else {
        panic!("expected uint16 pixels");
    };
    assert_eq!(array[[0, 1, 4, 2, 3]], 1);
    assert_eq!(array[[0, 0, 0, 0, 0]], 0);
}

#[test]
fn planes_get_a_singleton_z() {
    init();
    let blocks: Vec<RawBlock> = (0..3)
        .map(|t| Array2::from_elem((3, 4), t as f32 * 0.5).into_dyn().into())
        .collect();
    let pixels = reshape::reshape(Modality::Ht2dPhase, blocks).unwrap();
    assert_eq!(pixels.shape(), [1, 3, 1, 3, 4]);
    assert_eq!(pixels.pixel_type(), PixelType::Float);
    assert_eq!(pixels.byte_len(), 3 * 12 * 4);
}

#[test]
fn reshape_rejects_mismatches() {
    init();
    let wrong_type = vec![RawBlock::from(Array2::<u16>::zeros((3, 4)).into_dyn())];
    assert!(matches!(
        reshape::reshape(Modality::Brightfield, wrong_type),
        Err(Error::ArrayReshape(_))
    ));

    let wrong_rank = vec![RawBlock::from(Array2::<u16>::zeros((3, 4)).into_dyn())];
    assert!(matches!(
        reshape::reshape(Modality::Ht3d, wrong_rank),
        Err(Error::ArrayReshape(_))
    ));

    let ragged = vec![
        RawBlock::from(Array3::<u16>::zeros((2, 3, 4)).into_dyn()),
        RawBlock::from(Array3::<u16>::zeros((3, 3, 4)).into_dyn()),
    ];
    assert!(matches!(
        reshape::reshape(Modality::Ht3d, ragged),
        Err(Error::ArrayReshape(_))
    ));

    assert!(matches!(
        reshape::reshape(Modality::Ht3d, Vec::new()),
        Err(Error::ArrayReshape(_))
    ));
}

#[test]
fn geometry_is_checked_against_data() {
    init();
    let mut c = MemoryContainer::new();
    add_ht3d(&mut c, 4, 2);
    let entry = entry(Modality::Ht3d, "Data/3D", "Data/3D");
    let geometry = ImageGeometry::read(&c, &entry.data_path, &entry.group_path).unwrap();
    let pixels = reshape::load(&c, &entry).unwrap();
    assert_eq!(pixels.shape(), [1, 2, 4, SIZE_Y, SIZE_X]);
    reshape::check_geometry(&pixels, &geometry, Modality::Ht3d).unwrap();

    let lying = ImageGeometry {
        data_count: 3,
        ..geometry
    };
    assert!(matches!(
        reshape::check_geometry(&pixels, &lying, Modality::Ht3d),
        Err(Error::ArrayReshape(_))
    ));
}

#[test]
fn geometry_falls_back_to_parent_group() {
    init();
    let mut c = MemoryContainer::new();
    add_fl3d(&mut c, &[1], 6, 1);
    c.attr("Data/3DFL/CH1", "SizeZ", 5u32);
    let geometry = ImageGeometry::read(&c, "Data/3DFL/CH1", "Data/3DFL").unwrap();
    assert_eq!(geometry.size_z, Some(5));
    assert_eq!(geometry.size_x, SIZE_X as u32);
    assert_eq!(geometry.offset_z, Some(3.0));
    assert_eq!(geometry.plane_count(Modality::Fl3d(1)), 5);

    c.group("Data/BF");
    assert!(matches!(
        ImageGeometry::read(&c, "Data/BF", "Data/BF"),
        Err(Error::ModalityResolution(_))
    ));
    assert!(c.members("Data").unwrap().contains(&"BF".to_owned()));
}
