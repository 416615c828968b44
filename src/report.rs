//! CSV export and end-of-run summary.

use crate::aggregate::{Row, Snapshot};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write rows as `timestamp,key` lines. The header row is only emitted when
/// requested.
pub fn write_rows_csv(path: &Path, rows: &[Row], header: bool) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    if header {
        writeln!(writer, "timestamp,key")?;
    }
    for row in rows {
        writeln!(
            writer,
            "{},{}",
            csv_escape(&row.timestamp),
            csv_escape(&row.key)
        )?;
    }
    writer.flush()
}

/// Quote a field when it holds a delimiter, a quote or a line break;
/// embedded quotes are doubled.
fn csv_escape(field: &str) -> Cow<'_, str> {
    let needs_quoting = field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r'));
    if needs_quoting {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Print the run summary: packet counters from the driver plus message
/// totals and captured row counts from the snapshot.
pub fn print_summary(total_packets: u64, payload_packets: u64, snapshot: &Snapshot) {
    println!();
    println!("{}", "=".repeat(50));
    println!("Processing complete.");
    println!("  Total packets:        {}", total_packets);
    println!("  TCP payload packets:  {}", payload_packets);
    println!("  Input messages:       {}", snapshot.total_input_messages);
    println!("  Output messages:      {}", snapshot.total_output_messages);
    println!("  Input rows captured:  {}", snapshot.input_rows.len());
    println!("  Output rows captured: {}", snapshot.output_rows.len());
    println!("{}", "=".repeat(50));
}
