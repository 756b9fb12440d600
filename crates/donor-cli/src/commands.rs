//! Subcommand entry points.

use anyhow::Result;
use comfy_table::Table;

use donor_cli::pipeline::{self, RunConfig, RunResult};
use donor_ingest::TableFormat;
use donor_model::SourceTable;

use crate::cli::{FileTypeArg, RunArgs};
use crate::summary::apply_table_style;

/// Print the CLIF tables the pipeline reads.
pub fn run_tables() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Table", "File", "Required columns"]);
    apply_table_style(&mut table);
    for source in SourceTable::ALL {
        table.add_row(vec![
            source.name().to_string(),
            format!("{}.<csv|parquet>", source.file_stem()),
            source.required_columns().join(", "),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Run the derivation with the parsed arguments.
pub fn run_cohort(args: &RunArgs) -> Result<RunResult> {
    let config = RunConfig {
        tables_dir: args.tables_dir.clone(),
        format: match args.file_type {
            FileTypeArg::Csv => TableFormat::Csv,
            FileTypeArg::Parquet => TableFormat::Parquet,
        },
        site: args.site.clone(),
        output_dir: args.output_dir.clone(),
        outlier_config: args.outlier_config.clone(),
        contraindications: args.contraindications.clone(),
        gap_hours: args.gap_hours,
        dry_run: args.dry_run,
    };
    pipeline::run(&config)
}
