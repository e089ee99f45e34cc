#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the pre-event building inventory.
//!
//! Loads footprint and parcel `GeoJSON` collections, runs the pipeline, and
//! writes the resulting inventory plus a metadata file describing the run.
//!
//! Configuration is layered: defaults, then the `--config` TOML file, then
//! `PRE_EVENT_*` environment variables, then command-line flags. Ranges are
//! checked once, after the flags are applied.

mod io;

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pre_event_cli_utils::{IndicatifProgress, MultiProgress};
use pre_event_inventory_models::PipelineConfig;
use pre_event_pipeline::{Orchestrator, ProgressCallback, config};

use crate::io::{FieldNames, RunMetadata};

#[derive(Parser)]
#[command(
    name = "pre_event_inventory",
    about = "Pre-event building inventory pipeline"
)]
struct Cli {
    /// TOML configuration file. `PRE_EVENT_*` environment variables and
    /// flags take precedence over it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join footprints to parcels, deduplicate, and regularize
    Run {
        /// Footprint `FeatureCollection`
        #[arg(long)]
        footprints: PathBuf,
        /// Parcel `FeatureCollection`
        #[arg(long)]
        parcels: PathBuf,
        /// Output `GeoJSON` path. Metadata is written next to it.
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Regularize footprints without joining to parcels
    Regularize {
        /// Footprint `FeatureCollection`
        #[arg(long)]
        footprints: PathBuf,
        /// Output `GeoJSON` path. Metadata is written next to it.
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Print the effective configuration and exit
    CheckConfig,
}

#[derive(Args)]
struct FieldArgs {
    /// Property holding the footprint id
    #[arg(long, default_value = "structure_id")]
    id_field: String,
    /// Property holding the parcel join key, on both collections
    #[arg(long, default_value = "parcel_id")]
    key_field: String,
}

impl From<FieldArgs> for FieldNames {
    fn from(args: FieldArgs) -> Self {
        Self {
            id: args.id_field,
            key: args.key_field,
        }
    }
}

#[derive(Args)]
struct Overrides {
    /// Footprint ids per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Worker threads (0 uses every core)
    #[arg(long, global = true)]
    threads: Option<usize>,
    /// Minimum intersection-over-union to accept a regularized footprint
    #[arg(long, global = true)]
    min_iou: Option<f64>,
    /// Skip regularization and keep input geometry
    #[arg(long, global = true)]
    no_regularization: bool,
    /// Emit every candidate pair instead of resolving duplicates
    #[arg(long, global = true)]
    no_deduplication: bool,
    /// Only snap to orthogonal directions
    #[arg(long, global = true)]
    no_diagonals: bool,
}

impl Overrides {
    /// Applies the flags over the lower layers, then checks the result.
    fn resolve(&self, mut config: PipelineConfig) -> Result<PipelineConfig, config::ConfigError> {
        self.apply(&mut config);
        config::validate(&config)?;
        Ok(config)
    }

    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }
        if let Some(min_iou) = self.min_iou {
            config.regularization.min_acceptable_iou = min_iou;
        }
        if self.no_regularization {
            config.enable_regularization = false;
        }
        if self.no_deduplication {
            config.enable_deduplication = false;
        }
        if self.no_diagonals {
            config.regularization.allow_45_degree = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = pre_event_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = cli.overrides.resolve(config::load_unvalidated(cli.config.as_deref())?)?;

    match cli.command {
        Commands::Run {
            footprints,
            parcels,
            output,
            fields,
        } => run(&multi, config, &footprints, &parcels, &output, &fields.into())?,
        Commands::Regularize {
            footprints,
            output,
            fields,
        } => regularize(&multi, config, &footprints, &output, &fields.into())?,
        Commands::CheckConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn run(
    multi: &MultiProgress,
    config: PipelineConfig,
    footprints_path: &Path,
    parcels_path: &Path,
    output: &Path,
    fields: &FieldNames,
) -> Result<(), Box<dyn std::error::Error>> {
    let loading = IndicatifProgress::spinner(multi, "Loading footprints");
    let footprints = io::load_footprints(footprints_path, fields)?;
    loading.set_message("Loading parcels".to_string());
    let parcels = io::load_parcels(parcels_path, fields)?;
    loading.finish_and_clear();

    let progress = IndicatifProgress::footprints_bar(multi, "Processing footprints");
    let mut orchestrator = Orchestrator::new(config)?.with_progress(progress);
    let result = orchestrator.run(&footprints.items, &parcels.items)?;

    io::write_collection(output, &io::records_to_collection(&result.records, fields))?;
    log::info!("Wrote {} records to {}", result.records.len(), output.display());

    let metadata = RunMetadata {
        generated_at: Utc::now(),
        command: "run",
        footprints_path,
        parcels_path: Some(parcels_path),
        skipped_footprint_features: footprints.skipped,
        skipped_parcel_features: parcels.skipped,
        config: orchestrator.config(),
        report: &result.report,
    };
    let metadata_path = io::metadata_path(output);
    io::write_metadata(&metadata_path, &metadata)?;
    log::info!("Wrote run metadata to {}", metadata_path.display());

    Ok(())
}

fn regularize(
    multi: &MultiProgress,
    config: PipelineConfig,
    footprints_path: &Path,
    output: &Path,
    fields: &FieldNames,
) -> Result<(), Box<dyn std::error::Error>> {
    let loading = IndicatifProgress::spinner(multi, "Loading footprints");
    let footprints = io::load_footprints(footprints_path, fields)?;
    loading.finish_and_clear();

    let progress = IndicatifProgress::footprints_bar(multi, "Regularizing footprints");
    let orchestrator = Orchestrator::new(config)?.with_progress(progress);
    let result = orchestrator.regularize_collection(&footprints.items)?;

    let summary = &result.report.regularization;
    log::info!(
        "Area change {:.2}% mean, {:.2}% median, {:.2}% max; {:.1} vertices removed per footprint",
        summary.area_change_pct_mean,
        summary.area_change_pct_median,
        summary.area_change_pct_max,
        summary.vertex_reduction_mean
    );
    log::info!(
        "Orthogonal edges {:.1}% before, {:.1}% after",
        summary.orthogonality_before_pct,
        summary.orthogonality_after_pct
    );

    io::write_collection(output, &io::footprints_to_collection(&result.footprints, fields))?;
    log::info!("Wrote {} footprints to {}", result.footprints.len(), output.display());

    let metadata = RunMetadata {
        generated_at: Utc::now(),
        command: "regularize",
        footprints_path,
        parcels_path: None,
        skipped_footprint_features: footprints.skipped,
        skipped_parcel_features: 0,
        config: orchestrator.config(),
        report: &result.report,
    };
    io::write_metadata(&io::metadata_path(output), &metadata)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pre_event_inventory").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn flag_repairs_value_from_lower_layer() {
        let lower = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        let cli = parse(&["--batch-size", "10", "check-config"]);

        let config = cli.overrides.resolve(lower).unwrap();
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn invalid_flag_value_is_rejected() {
        let cli = parse(&["check-config", "--min-iou", "1.5"]);
        let err = cli.overrides.resolve(PipelineConfig::default()).unwrap_err();
        assert!(
            matches!(err, config::ConfigError::Invalid { field: "min_acceptable_iou", .. }),
            "{err}"
        );
    }

    #[test]
    fn boolean_flags_switch_stages_off() {
        let cli = parse(&["--no-regularization", "--no-diagonals", "check-config"]);
        let config = cli.overrides.resolve(PipelineConfig::default()).unwrap();

        assert!(!config.enable_regularization);
        assert!(config.enable_deduplication);
        assert!(!config.regularization.allow_45_degree);
    }
}
