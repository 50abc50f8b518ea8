use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::reconcile::Disposition;
use crate::report::Outcome;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn outcome_cell(outcome: &Outcome) -> Cell {
    match outcome {
        Outcome::Applied => Cell::new("applied").fg(TableColor::Green),
        Outcome::Skipped { reason } => {
            Cell::new(format!("skipped ({reason})")).fg(TableColor::Yellow)
        }
        Outcome::Failed { error } => Cell::new(format!("failed: {error}")).fg(TableColor::Red),
    }
}

pub fn disposition_cell(disposition: Disposition) -> Cell {
    match disposition {
        Disposition::MergedButOpen => Cell::new("merged, ticket open").fg(TableColor::Red),
        Disposition::MrOpen => Cell::new("MR open").fg(TableColor::Yellow),
        Disposition::MergedAndClosed => Cell::new("merged and closed").fg(TableColor::Green),
        Disposition::NoLinkedMr => Cell::new("no linked MR").fg(TableColor::DarkGrey),
    }
}
