//! Read-only progress report over an identifier range
//!
//! Uses the same detector as the crawler, so "complete" here means the next
//! crawl would skip the unit. Never touches the network.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::Path;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use papercrawl_core::fmt_num;

use crate::detect;
use crate::identifier::{IdRange, Identifier};
use crate::layout::{self, WorkUnit};
use crate::ledger::{self, LedgerEntry};
use crate::stage::{Stage, UnitState};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitStatus {
    pub id: Identifier,
    pub done: BTreeSet<Stage>,
    /// Detected state; `Failed` when incomplete and the ledger has an entry
    pub state: UnitState,
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub units: Vec<UnitStatus>,
    pub stage_counts: BTreeMap<Stage, usize>,
}

/// Inspect every unit of `range` under `root`.
pub fn scan(root: &Path, range: &IdRange) -> io::Result<StatusReport> {
    let entries = ledger::read_entries(&layout::ledger_path(root))?;
    // Latest entry per identifier
    let mut last_failure: HashMap<Identifier, &LedgerEntry> = HashMap::new();
    for entry in &entries {
        last_failure.insert(entry.id, entry);
    }

    let mut report = StatusReport::default();
    for id in range {
        let unit = WorkUnit::new(root, id);
        let done = detect::completed_stages(&unit);
        for stage in &done {
            *report.stage_counts.entry(*stage).or_default() += 1;
        }
        let mut state = UnitState::from_completed(&done);
        if !state.is_complete() {
            if let Some(entry) = last_failure.get(&id) {
                state = UnitState::Failed {
                    stage: entry.stage,
                    reason: entry.reason.clone(),
                };
            }
        }
        report.units.push(UnitStatus { id, done, state });
    }
    Ok(report)
}

impl StatusReport {
    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn complete(&self) -> usize {
        self.units.iter().filter(|u| u.state.is_complete()).count()
    }

    pub fn failed(&self) -> usize {
        self.units.iter().filter(|u| u.state.is_failed()).count()
    }

    pub fn stage_count(&self, stage: Stage) -> usize {
        self.stage_counts.get(&stage).copied().unwrap_or(0)
    }

    /// Units the next crawl would still work on.
    pub fn incomplete(&self) -> impl Iterator<Item = &UnitStatus> {
        self.units.iter().filter(|u| !u.state.is_complete())
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Stage")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Complete").fg(Color::Cyan),
                Cell::new("Missing").fg(Color::Cyan),
            ]);

        let total = self.total();
        for stage in Stage::ALL {
            let n = self.stage_count(stage);
            table.add_row(vec![
                Cell::new(stage.name()),
                Cell::new(fmt_num(n)),
                Cell::new(fmt_num(total - n)),
            ]);
        }
        table.add_row(vec![
            Cell::new("all stages").fg(Color::Green),
            Cell::new(fmt_num(self.complete())).fg(Color::Green),
            Cell::new(fmt_num(total - self.complete())).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("in failure ledger").fg(Color::Red),
            Cell::new(""),
            Cell::new(fmt_num(self.failed())).fg(Color::Red),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "{}/{} units complete, {} with recorded failures",
            fmt_num(self.complete()),
            fmt_num(self.total()),
            fmt_num(self.failed())
        );
        for stage in Stage::ALL {
            log::info!("  {stage}: {}", fmt_num(self.stage_count(stage)));
        }
    }
}
