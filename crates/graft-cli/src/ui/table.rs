//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `graft plan` | `render_plan_table()` |
//! | `graft load` | `render_error_table()` |
//! | `graft validate` | `render_violation_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};
use graft_core::LoadError;

use super::format::{format_thousands, truncate_str};

/// Longest message shown in a table cell.
const MESSAGE_WIDTH: usize = 80;

/// One type in a batch plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRow {
    pub type_name: String,
    /// `vertex` or `edge`
    pub kind: &'static str,
    pub records: u64,
    pub batches: u64,
}

/// One rejected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRow {
    pub type_name: String,
    pub record: usize,
    pub message: String,
}

/// Render a batch plan.
///
/// ```text
/// TYPE      KIND     RECORDS   BATCHES
/// Person    vertex     1,200         3
/// KNOWS     edge         800         2
/// ```
pub fn render_plan_table(rows: &[PlanRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("TYPE"),
        Cell::new("KIND"),
        Cell::new("RECORDS").set_alignment(CellAlignment::Right),
        Cell::new("BATCHES").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(truncate_str(&row.type_name, 30)),
            Cell::new(row.kind),
            Cell::new(format_thousands(row.records)).set_alignment(CellAlignment::Right),
            Cell::new(format_thousands(row.batches)).set_alignment(CellAlignment::Right),
        ]);
    }

    table.to_string()
}

/// Render the errors recorded by a load.
///
/// ```text
/// KIND        TYPE    BATCH   RECORD   MESSAGE
/// execution   KNOWS       0        1   endpoint not found: p9
/// ```
pub fn render_error_table(errors: &[LoadError]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("KIND"),
        Cell::new("TYPE"),
        Cell::new("BATCH").set_alignment(CellAlignment::Right),
        Cell::new("RECORD").set_alignment(CellAlignment::Right),
        Cell::new("MESSAGE"),
    ]);

    let optional = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    for error in errors {
        table.add_row(vec![
            Cell::new(error.kind.to_string()),
            Cell::new(error.type_name.as_deref().unwrap_or("-")),
            Cell::new(optional(error.batch)).set_alignment(CellAlignment::Right),
            Cell::new(optional(error.record)).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&error.message, MESSAGE_WIDTH)),
        ]);
    }

    table.to_string()
}

/// Render schema violations.
pub fn render_violation_table(rows: &[ViolationRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("TYPE"),
        Cell::new("RECORD").set_alignment(CellAlignment::Right),
        Cell::new("VIOLATION"),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.type_name),
            Cell::new(row.record).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&row.message, MESSAGE_WIDTH)),
        ]);
    }

    table.to_string()
}
