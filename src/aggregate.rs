//! Run-wide aggregation of extracted message rows.
//!
//! All flow handlers share one `Aggregator`. Row storage is bounded by the
//! configured CSV cap; the totals keep counting past it, so the stored rows
//! are an earliest-wins sample of the full population.

use std::sync::Mutex;

/// One extracted message: timestamp plus correlation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub timestamp: String,
    pub key: String,
}

#[derive(Debug, Default)]
struct State {
    input_rows: Vec<Row>,
    output_rows: Vec<Row>,
    total_input: u64,
    total_output: u64,
}

/// Thread-safe counters and bounded row buffers for both directions.
#[derive(Debug)]
pub struct Aggregator {
    inner: Mutex<State>,
    max_csv_rows: usize,
}

impl Aggregator {
    pub fn new(max_csv_rows: usize) -> Self {
        Aggregator {
            inner: Mutex::new(State::default()),
            max_csv_rows,
        }
    }

    /// Record an input-direction message. The row is stored only while the
    /// input buffer is below the cap; the total always increments.
    pub fn add_input_row(&self, row: Row) {
        let mut state = self.inner.lock().unwrap();
        if state.input_rows.len() < self.max_csv_rows {
            state.input_rows.push(row);
        }
        state.total_input += 1;
    }

    /// Record an output-direction message.
    pub fn add_output_row(&self, row: Row) {
        let mut state = self.inner.lock().unwrap();
        if state.output_rows.len() < self.max_csv_rows {
            state.output_rows.push(row);
        }
        state.total_output += 1;
    }

    /// Owned, mutually consistent copy of rows and totals.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.lock().unwrap();
        Snapshot {
            input_rows: state.input_rows.clone(),
            output_rows: state.output_rows.clone(),
            total_input_messages: state.total_input,
            total_output_messages: state.total_output,
        }
    }
}

/// Point-in-time copy of the aggregator state, safe to read without further
/// synchronization.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub input_rows: Vec<Row>,
    pub output_rows: Vec<Row>,
    pub total_input_messages: u64,
    pub total_output_messages: u64,
}
