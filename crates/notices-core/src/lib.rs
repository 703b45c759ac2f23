pub mod adapters;
pub mod cleanup;
pub mod config;
pub mod docx;
pub mod error;
pub mod graph;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod print;
pub mod render;
pub mod scaffold;
pub mod sequencer;
pub mod source;
pub mod table;
pub mod types;
pub mod writeback;
pub mod xlsx;

pub use error::{NoticeError, Result};
