//! Stitch the tile files of an experiment into a single virtual Zarr dataset.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tilestitch::{config::global_config_mut, pipeline::Pipeline, source::DataKind};

/// Stitch tiled simulation output into a single virtual Zarr dataset.
#[derive(Parser, Debug)]
#[command(name = "tilestitch", version)]
struct Args {
    /// The directory holding the tile files.
    source_data_path: PathBuf,

    /// The experiment name, the file name prefix of the tile files.
    experiment_name: String,

    /// The data kind: 3d, xy, xz, yz, optionally followed by __first_NxM.
    #[arg(long, default_value = "3d", env = "TILESTITCH_DATA_KIND")]
    data_kind: DataKind,

    /// The number of times manifest generation is retried per file.
    #[arg(long, env = "TILESTITCH_RETRIES")]
    retries: Option<usize>,

    /// The maximum number of files processed concurrently (0 for unlimited).
    #[arg(long, env = "TILESTITCH_CONCURRENT_LIMIT")]
    concurrent_limit: Option<usize>,

    /// Comma separated dimensions never used to choose a subset.
    #[arg(long, value_delimiter = ',')]
    non_split_dims: Option<Vec<String>>,

    /// Ignore and overwrite cached subset manifests.
    #[arg(long)]
    refresh: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,tilestitch=info".into()),
        )
        .init();

    let args = Args::parse();

    {
        let mut config = global_config_mut();
        if let Some(retries) = args.retries {
            config.set_generation_retries(retries);
        }
        if let Some(concurrent_limit) = args.concurrent_limit {
            config.set_generation_concurrent_limit(concurrent_limit);
        }
        if let Some(non_split_dims) = args.non_split_dims {
            config.set_non_split_dimensions(non_split_dims);
        }
    }

    let pipeline = Pipeline::new().with_refresh(args.refresh);
    match pipeline.run(&args.source_data_path, &args.experiment_name, args.data_kind) {
        Ok(output) => {
            println!("{}", output.manifest_path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("tilestitch: {err}");
            ExitCode::FAILURE
        }
    }
}
