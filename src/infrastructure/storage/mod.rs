//! Durable storage: gold datasets in, run results and history out.

pub mod dataset;
pub mod json_store;

pub use dataset::{load_conversations, load_qa_dataset};
pub use json_store::{
    iteration_file_name, load_history, load_run, load_summary, write_json, JsonStore, HISTORY_FILE,
};
