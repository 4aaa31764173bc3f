#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::{Context, Result},
	bintable_csv::{output, table},
	clap::Parser,
	std::{
		fs::File,
		io::{self, BufReader, BufWriter},
		path::PathBuf,
	},
	tracing::info,
	tracing_subscriber::{fmt, EnvFilter},
};

fn main() -> Result<()> {
	#[derive(Parser)]
	#[clap(version, about = "Converts an exported binary data table into <input>.csv")]
	struct Args {
		/// Binary table to convert
		#[clap(value_parser)]
		inputPath: PathBuf,
	}
	let Args { inputPath } = Args::parse();

	fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(io::stderr)
		.init();

	let table = {
		let file = File::open(&inputPath)
			.with_context(|| format!("Failed to open file {}", inputPath.display()))?;
		table::decode(&mut BufReader::new(file))
			.with_context(|| format!("Failed to decode {}", inputPath.display()))?
	};

	let outputPath = output::csvPathFor(&inputPath);
	let file = File::create(&outputPath)
		.with_context(|| format!("Failed to create file {}", outputPath.display()))?;
	output::writeCsv(&table, BufWriter::new(file))
		.with_context(|| format!("Failed to write {}", outputPath.display()))?;
	info!(path = %outputPath.display(), rows = table.rows.len(), "csv written");

	println!(
		"CSV export complete: {}",
		outputPath.file_name().map_or_else(|| outputPath.display().to_string(), |name| name.to_string_lossy().into_owned())
	);
	Ok(())
}
