use std::io::{self, Write};

use serde::Serialize;

use crate::harvest::RunOutcome;
use crate::progress::{ProgressSink, StatusEvent};
use crate::store::StoredNode;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(outcome: &RunOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_tree(tree: &StoredNode) -> io::Result<()> {
        Self::print_json(tree)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: StatusEvent) {}
}
