//! Engine rebuild adapters

pub mod tuning_file;

pub use tuning_file::TuningFileRebuilder;
