#![allow(dead_code)]
use std::{
    fs,
    path::{Path, PathBuf},
};

use ndarray::{Array2, Array3};
use tcf_ometiff::{
    config::{
        AcquisitionConfig, BasicConfig, JobParameters, KeyValueFormat, RunConfig, StagePosition,
        TilingInfo, parse_key_values,
    },
    container::MemoryContainer,
    modality::{Modality, PlanEntry},
};

pub fn init() {
    env_logger::try_init().ok();
}

pub const BASIC_CONFIG: &str = "\
exper_id,Experimenter:0
exper_email,jane.doe@example.org
exper_inst,Example Institute
exper_firstn,Jane
exper_lastn,Doe
exper_usern,jdoe
exp_desc,Live cell imaging
proj_id,Project:0
proj_name,Cells
proj_desc,Imaging of cells
mic_id,Microscope:0
lot,L-17
det_id,Detector:0
obj_id,Objective:0
light_source_id,LightSource:0
instr_id,Instrument:0
";

pub const RUN_CONFIG: &str = "\
Serial,HT-2H-0042
NA,1.2
M,60
Immersion_RI1.337
Camera_Shutter,1.5
Camera_Gain,0.3
BF_Camera_Shutter,2
BF_Camera_Gain,1
FLCH0_Fluorophore_Emission,450
FLCH0_Fluorophore_Name,DAPI
FLCH0_Camera_Shutter,100
FLCH0_Camera_Gain,2
FLCH1_Fluorophore_Emission,520
FLCH1_Fluorophore_Name,GFP
FLCH1_Camera_Shutter,150
FLCH1_Camera_Gain,3
HT_Count,1
BF_Count,1
FLCH0_Count,2
FLCH1_Count,1
FLCH2_Count,0
";

pub const JOB_PARAMETERS: &str = "\
[JobParameter]
Title=HeLa timelapse
Operator=jdoe
";

pub const POSITION: &str = "1.5\n2.25\n0.125\n0\n";

pub const TILING: &str = "\
tile_x,1
tile_y,0
tile_timestep,3
tile_timestep_size,20.5
";

pub fn basic_config() -> BasicConfig {
    BasicConfig::from_map(parse_key_values(BASIC_CONFIG, KeyValueFormat::COMMA))
        .expect("valid basic config")
}

pub fn run_config(text: &str) -> RunConfig {
    RunConfig::from_map(parse_key_values(text, KeyValueFormat::RUN_CONFIG)).expect("valid run config")
}

pub fn acquisition(run: &str, tiling: Option<&str>) -> AcquisitionConfig {
    AcquisitionConfig {
        folder: PathBuf::from("acquisition"),
        run: run_config(run),
        job: JobParameters::from_map(parse_key_values(
            JOB_PARAMETERS,
            KeyValueFormat::JOB_PARAMETERS,
        )),
        position: StagePosition::parse(POSITION).expect("valid position"),
        tiling: tiling.map(|t| TilingInfo::from_map(parse_key_values(t, KeyValueFormat::COMMA))),
    }
}

/// Write the text files of an acquisition folder.
pub fn write_folder(top: &Path, name: &str, run: Option<&str>, tiling: Option<&str>) -> PathBuf {
    let folder = top.join(name);
    fs::create_dir_all(&folder).unwrap();
    if let Some(run) = run {
        fs::write(folder.join("config.dat"), run).unwrap();
    }
    fs::write(folder.join("JobParameter.tcp"), JOB_PARAMETERS).unwrap();
    fs::write(folder.join("position.txt"), POSITION).unwrap();
    if let Some(tiling) = tiling {
        fs::write(folder.join("tiling_info.txt"), tiling).unwrap();
    }
    folder
}

pub const SIZE_X: usize = 4;
pub const SIZE_Y: usize = 3;

fn volume(z: usize, seed: u16) -> Array3<u16> {
    Array3::from_shape_fn((z, SIZE_Y, SIZE_X), |(z, y, x)| {
        seed + (z * 100 + y * 10 + x) as u16
    })
}

fn plane(seed: u16) -> Array2<u16> {
    Array2::from_shape_fn((SIZE_Y, SIZE_X), |(y, x)| seed + (y * 10 + x) as u16)
}

fn geometry(c: &mut MemoryContainer, path: &str, size_z: Option<u32>, data_count: u32) {
    c.attr(path, "SizeX", SIZE_X as u32)
        .attr(path, "SizeY", SIZE_Y as u32)
        .attr(path, "DataCount", data_count)
        .attr(path, "ResolutionX", 0.1234)
        .attr(path, "ResolutionY", 0.1234)
        .attr(path, "TimeInterval", 2.0);
    if let Some(z) = size_z {
        c.attr(path, "SizeZ", z).attr(path, "ResolutionZ", 0.3);
    }
}

/// `Data/3D`: `size_z` slices per timestep.
pub fn add_ht3d(c: &mut MemoryContainer, size_z: u32, data_count: u32) {
    geometry(c, "Data/3D", Some(size_z), data_count);
    for t in 0..data_count {
        let path = format!("Data/3D/{t:06}");
        c.dataset(&path, volume(size_z as usize, t as u16).into_dyn());
        if t == 0 {
            c.attr(&path, "RecordingTime", "2021-05-04 13:22:10.500");
        }
    }
}

/// `Data/2DMIP` without a `SizeZ` attribute.
pub fn add_ht_mip(c: &mut MemoryContainer, data_count: u32) {
    geometry(c, "Data/2DMIP", None, data_count);
    for t in 0..data_count {
        c.dataset(&format!("Data/2DMIP/{t:06}"), plane(t as u16).into_dyn());
    }
}

/// `Data/3DFL/CH{n}` volumes; geometry on the parent group.
pub fn add_fl3d(c: &mut MemoryContainer, channels: &[u8], size_z: u32, data_count: u32) {
    geometry(c, "Data/3DFL", Some(size_z), data_count);
    c.attr("Data/3DFL", "OffsetZ", 3.0);
    for n in channels {
        for t in 0..data_count {
            c.dataset(
                &format!("Data/3DFL/CH{n}/{t:06}"),
                volume(size_z as usize, t as u16).into_dyn(),
            );
        }
    }
}

pub fn entry(modality: Modality, group: &str, data: &str) -> PlanEntry {
    PlanEntry {
        modality,
        group_path: group.to_owned(),
        data_path: data.to_owned(),
    }
}
