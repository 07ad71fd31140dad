//! Loading inputs and running the selection pass on them.

use derive_more::{Display, Error, From};
use selkie_isel::{
    InstructionSelect, InstructionSelector, MatchTable, SelectError, SelectOptions, SelectStats,
    TableError, assemble,
};
use selkie_mir::{ParseError, TargetInfo, parse_function, print_function};
use tracing::{debug, info};

use crate::toy::ToySelector;

#[derive(Debug, Display, Error, From)]
pub enum DriverError {
    #[display("{_0}")]
    Parse(ParseError),
    #[display("invalid match table: {_0}")]
    Table(TableError),
    #[display("invalid JSON match table: {_0}")]
    Json(serde_json::Error),
    #[display("{_0}")]
    Select(SelectError),
}

/// Load a match table from its JSON form (an array of integers) or from
/// assembly source. The table is validated either way.
pub fn load_table(target: &TargetInfo, text: &str) -> Result<MatchTable, DriverError> {
    if text.trim_start().starts_with('[') {
        let table: MatchTable = serde_json::from_str(text)?;
        table.validate()?;
        debug!(entries = table.len(), "loaded JSON match table");
        return Ok(table);
    }
    let table = assemble(target, text)?;
    debug!(entries = table.len(), "assembled match table");
    Ok(table)
}

/// Parse a function, select it and print the result.
pub fn select_source(
    selector: &ToySelector,
    source: &str,
    options: SelectOptions,
) -> Result<(String, SelectStats), DriverError> {
    let target = selector.target();
    let mut func = parse_function(target, source)?;
    let stats = InstructionSelect::new(selector, options).run(&mut func)?;
    info!(
        function = %func.name,
        selected = stats.selected,
        erased_dead = stats.erased_dead,
        unselected = stats.unselected,
        "selected function"
    );
    Ok((print_function(target, &func), stats))
}
