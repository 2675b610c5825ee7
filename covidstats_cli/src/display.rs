use comfy_table::{presets::NOTHING, *};
use covidstats::report::{ColumnKind, ReportKind, ReportTable};
use covidstats::LocationSummary;
use itertools::Itertools;
use strum::IntoEnumIterator;

/// A borderless table with horizontal rules, shared by every listing.
fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_reports() {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Report").add_attribute(Attribute::Bold),
        Cell::new("Description").add_attribute(Attribute::Bold),
        Cell::new("Default rows").add_attribute(Attribute::Bold),
    ]);
    for kind in ReportKind::iter() {
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(kind.description()),
            Cell::new(
                kind.default_top()
                    .map(|top| top.to_string())
                    .unwrap_or_else(|| "all".to_string()),
            ),
        ]);
    }
    println!("\n{}", table);
}

pub fn display_report(report: &ReportTable, decimal_places: usize) {
    let mut table = new_table();
    table.set_header(
        report
            .columns()
            .iter()
            .map(|column| Cell::new(&column.name).add_attribute(Attribute::Bold))
            .collect_vec(),
    );
    let alignments = report
        .columns()
        .iter()
        .map(|column| match column.kind {
            ColumnKind::Integer | ColumnKind::Float => CellAlignment::Right,
            ColumnKind::Text | ColumnKind::Date => CellAlignment::Left,
        })
        .collect_vec();
    for row in report.rows() {
        table.add_row(
            row.iter()
                .zip(&alignments)
                .map(|(value, alignment)| {
                    Cell::new(value.display(decimal_places)).set_alignment(*alignment)
                })
                .collect_vec(),
        );
    }
    println!("\n{}", table);
    println!("{} row(s)", report.len());
}

pub fn display_locations(locations: &[LocationSummary]) {
    let mut table = new_table();
    table.set_header(
        [
            "Location",
            "Continent",
            "Population",
            "Death rows",
            "Vaccination rows",
            "First date",
            "Last date",
        ]
        .into_iter()
        .map(|header| Cell::new(header).add_attribute(Attribute::Bold))
        .collect_vec(),
    );
    for summary in locations {
        table.add_row(vec![
            Cell::new(&summary.location),
            Cell::new(summary.continent.as_deref().unwrap_or_default()),
            Cell::new(
                summary
                    .population
                    .map(|p| format!("{p:.0}"))
                    .unwrap_or_default(),
            )
            .set_alignment(CellAlignment::Right),
            Cell::new(summary.death_rows).set_alignment(CellAlignment::Right),
            Cell::new(summary.vaccination_rows).set_alignment(CellAlignment::Right),
            Cell::new(summary.first_date.map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(summary.last_date.map(|d| d.to_string()).unwrap_or_default()),
        ]);
    }
    println!("\n{}", table);
}
