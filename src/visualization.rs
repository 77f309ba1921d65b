use std::{collections::HashSet, fs::File, io::Write, path::Path};

use crate::{
    scan_state::ScanState,
    stabilizer::{ScanStabilizer, StateTransition},
};

/// The fixed edges of the stabilizer state machine: (from, to, label)
const EDGES: [(&str, &str, &str); 6] = [
    ("Idle", "Accumulating", "plausible read"),
    ("Accumulating", "Accumulating", "same or new read"),
    ("Accumulating", "Locked", "run >= threshold, cooldown over"),
    ("Locked", "Idle", "unlock"),
    ("Accumulating", "Idle", "reset"),
    ("Locked", "Idle", "reset"),
];

/// Visualization tools for the scan stabilizer
#[derive(Debug)]
pub struct StabilizerVisualization;

impl StabilizerVisualization {
    /// Generate a DOT graph of the stabilizer, marking the current state.
    ///
    /// With `highlight_path`, edges that appear in the recorded history are
    /// drawn in red.
    #[must_use]
    pub fn generate_dot(stabilizer: &ScanStabilizer, highlight_path: bool) -> String {
        let mut dot = String::from("digraph scan_stabilizer {\n");
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=circle, style=filled, fillcolor=lightblue];\n");

        let current = stabilizer.state();
        for label in ["Idle", "Accumulating", "Locked"] {
            if label == current.label() {
                dot.push_str(&format!(
                    "  {label} [label=\"{}\", fillcolor=palegreen, peripheries=2];\n",
                    escape(&Self::format_state(&current)),
                ));
            } else {
                dot.push_str(&format!("  {label};\n"));
            }
        }

        let travelled: HashSet<(&str, &str)> = if highlight_path {
            stabilizer.get_history().iter().map(|t| (t.from.label(), t.to.label())).collect()
        } else {
            HashSet::new()
        };

        for (from, to, label) in EDGES {
            let style = if travelled.contains(&(from, to)) {
                "color=red, penwidth=2.0"
            } else {
                "color=black"
            };
            dot.push_str(&format!("  {from} -> {to} [label=\"{}\", {style}];\n", escape(label)));
        }

        dot.push_str("}\n");
        dot
    }

    /// Save the DOT representation to a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to
    pub fn save_dot_to_file(dot: &str, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path)?;
        file.write_all(dot.as_bytes())?;
        Ok(())
    }

    /// Generate a markdown table of the history
    #[must_use]
    pub fn history_table(transitions: &[StateTransition]) -> String {
        if transitions.is_empty() {
            return "No transitions recorded yet.".to_string();
        }

        let mut table = String::from("| # | At (ms) | From | To |\n");
        table.push_str("|---|---------|------|----|\n");

        for (i, transition) in (1_usize..).zip(transitions) {
            table.push_str(&format!(
                "| {i} | {} | {} | {} |\n",
                transition.at,
                Self::format_state(&transition.from),
                Self::format_state(&transition.to)
            ));
        }

        table
    }

    /// Format a state for display
    fn format_state(state: &ScanState) -> String {
        match state {
            ScanState::Idle => "Idle".to_string(),
            ScanState::Accumulating { code, same_count } => {
                format!("Accumulating({code} x{same_count})")
            }
            ScanState::Locked(code) => format!("Locked({code})"),
        }
    }
}

/// Escape double quotes for a DOT label
fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}
