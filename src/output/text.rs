//! Plain-text output.

use std::io::{self, Write};

use crate::duplicates::{GroupTable, QueryMatch};

/// Print every group: newline-separated members and a blank line after each
/// group, or one space-separated line per group with `same_line`.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_groups<W: Write>(groups: &GroupTable, same_line: bool, out: &mut W) -> io::Result<()> {
    for (_, members) in groups.iter() {
        let paths: Vec<String> = members.iter().map(|p| p.display().to_string()).collect();
        if same_line {
            writeln!(out, "{}", paths.join(" "))?;
        } else {
            writeln!(out, "{}", paths.join("\n"))?;
            writeln!(out)?;
        }
    }
    out.flush()
}

/// Print query matches as `distance<TAB>path`.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_query_matches<W: Write>(matches: &[QueryMatch], out: &mut W) -> io::Result<()> {
    for m in matches {
        writeln!(out, "{}\t{}", m.distance, m.path.display())?;
    }
    out.flush()
}
