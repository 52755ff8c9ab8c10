#![deny(unsafe_code)]
// Clippy lint configuration for CI.
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args
)]

//! # tandem - order-preserving two-thread transform pipeline
//!
//! `tandem` accelerates a sequential "read item → transform item → emit
//! result" loop by overlapping transformation across two threads while
//! guaranteeing output identical to a sequential run. One thread (the
//! driver) reads items and feeds a bounded job queue; a dedicated worker
//! transforms them; results are emitted strictly in arrival order. When the
//! worker falls behind, the driver steals transformations itself.
//!
//! ## Modules
//!
//! - **[`queue`]** - the bounded, order-preserving job queue (the core)
//! - **[`slot`]** - slot table and the compaction-stable identity scheme
//! - **[`balance`]** - the driver's work-stealing heuristics
//! - **[`pipeline`]** - end-to-end driver, `Source`/`Transform` traits
//! - **[`frame`]** - length-prefixed record framing for byte streams
//! - **[`transform`]** - built-in transforms (hex dump, reverse, inflate)
//! - **[`progress`]** - interval progress logging
//! - **[`errors`]** - error types; every failure is fatal to the run
//!
//! ## Quick start
//!
//! ```
//! use std::io::Cursor;
//! use tandem_lib::frame::{write_frame, FrameReader};
//! use tandem_lib::pipeline::{self, PipelineConfig};
//! use tandem_lib::transform::Reverse;
//!
//! # fn main() -> Result<(), tandem_lib::errors::PipelineError> {
//! let mut input = Vec::new();
//! write_frame(&mut input, b"abc").unwrap();
//! write_frame(&mut input, b"def").unwrap();
//!
//! let source = FrameReader::new(Cursor::new(input), "<memory>");
//! let mut out = Vec::new();
//! pipeline::run(source, &Reverse, &mut out, &PipelineConfig::default())?;
//! assert_eq!(out, b"cbafed");
//! # Ok(())
//! # }
//! ```

pub mod balance;
pub mod errors;
pub mod frame;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod slot;
pub mod transform;

pub use errors::{PipelineError, Result};
pub use pipeline::{PipelineConfig, PipelineSummary, Source, Transform};
