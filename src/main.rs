use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{error, info};
use tcf_ometiff::{
    container::Hdf5Container,
    driver::{self, ConvertOptions, Converter},
    sink::OmeTiffWriter,
};

#[derive(Parser)]
#[command(name = "tcf-ometiff")]
#[command(about = "Convert Tomocube TCF acquisitions into OME-TIFF")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the acquisition in one folder.
    Parse {
        /// Folder holding <name>.TCF
        folder: PathBuf,
        /// Project metadata file
        config_file_path: PathBuf,
        #[command(flatten)]
        flags: Flags,
    },
    /// Convert every acquisition folder inside a top folder.
    ParseMultiple {
        top_folder: PathBuf,
        /// Project metadata file
        config_file_path: PathBuf,
        #[command(flatten)]
        flags: Flags,
    },
}

#[derive(Args)]
struct Flags {
    /// Also write the OME-XML to <name>.ome.xml
    #[arg(long)]
    output_xml: bool,
    /// Convert maximum intensity projections (default)
    #[arg(long, overrides_with = "no_mip")]
    include_mip: bool,
    /// Leave out maximum intensity projections
    #[arg(long, visible_alias = "no-include-mip", overrides_with = "include_mip")]
    no_mip: bool,
}

impl From<&Flags> for ConvertOptions {
    fn from(flags: &Flags) -> Self {
        Self {
            output_xml: flags.output_xml,
            include_mip: !flags.no_mip,
        }
    }
}

fn init_logging() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    builder.init();
}

fn run(cli: Cli) -> tcf_ometiff::Result<bool> {
    match cli.command {
        Commands::Parse {
            folder,
            config_file_path,
            flags,
        } => {
            let basic = driver::load_basic_config(&config_file_path)?;
            let mut converter =
                Converter::new(Hdf5Container::open, OmeTiffWriter::new(), (&flags).into());
            let report = converter.convert_folder(&folder, &basic)?;
            info!(
                "Wrote {} images ({} planes) to {}",
                report.document.images.len(),
                report.plane_count,
                report.tiff_path.display()
            );
            Ok(true)
        }
        Commands::ParseMultiple {
            top_folder,
            config_file_path,
            flags,
        } => {
            let basic = driver::load_basic_config(&config_file_path)?;
            let mut converter =
                Converter::new(Hdf5Container::open, OmeTiffWriter::new(), (&flags).into());
            let report = converter.convert_all(&top_folder, &basic)?;
            Ok(report.skipped() == 0)
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(args: &[&str]) -> ConvertOptions {
        let base = ["tcf-ometiff", "parse", "dir", "project.json"];
        let cli = Cli::try_parse_from(base.iter().chain(args).copied()).unwrap();
        let Commands::Parse { flags, .. } = cli.command else {
            panic!("expected parse");
        };
        (&flags).into()
    }

    #[test]
    fn mip_flags() {
        assert!(options(&[]).include_mip);
        assert!(options(&["--include-mip"]).include_mip);
        assert!(!options(&["--no-mip"]).include_mip);
        assert!(!options(&["--no-include-mip"]).include_mip);
        assert!(options(&["--no-include-mip", "--include-mip"]).include_mip);
        assert!(!options(&["--include-mip", "--no-mip"]).include_mip);
        assert!(options(&["--output-xml"]).output_xml);
    }
}
