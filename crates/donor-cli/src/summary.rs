//! Terminal summary of a derivation run.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use donor_cli::pipeline::RunResult;
use donor_report::AttritionTable;

pub fn print_summary(result: &RunResult) {
    println!("Site: {}", result.site);
    println!("Patients in source: {}", result.total_patients);
    println!("Inpatient decedents: {}", result.cohort.len());
    if let Some(outputs) = &result.outputs {
        println!("Cohort: {}", outputs.cohort_parquet.display());
        println!("Strobe counts: {}", outputs.strobe_counts.display());
    } else {
        println!("Dry run: no files written");
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Definition"),
        header_cell("Stage"),
        header_cell("Retained"),
        header_cell("Excluded"),
        header_cell("% prev"),
        header_cell("% initial"),
        header_cell("Reasons"),
    ]);
    apply_table_style(&mut table);
    for index in 2..=5 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    add_stage_rows(&mut table, &result.calc);
    add_stage_rows(&mut table, &result.clif);
    println!("{table}");

    println!(
        "CALC qualified: {}   CLIF eligible donors: {}",
        result.calc.final_retained(),
        result.clif.final_retained()
    );
}

fn add_stage_rows(table: &mut Table, attrition: &AttritionTable) {
    for stage in &attrition.stages {
        let reasons = stage
            .sub_reasons
            .iter()
            .map(|(name, n)| format!("{name}={n}"))
            .collect::<Vec<_>>()
            .join("; ");
        table.add_row(vec![
            Cell::new(&attrition.definition)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new(&stage.stage),
            Cell::new(stage.retained),
            Cell::new(stage.excluded),
            Cell::new(format!("{:.1}", stage.pct_of_previous)),
            Cell::new(format!("{:.1}", stage.pct_of_initial)),
            Cell::new(reasons),
        ]);
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
