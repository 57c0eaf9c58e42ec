//! docmatrix-lib: build orchestration for multi-language document sets.
//!
//! A build expands three independent axes (language, flavor, format) into a
//! matrix of tasks and runs each task through a format converter:
//! - `config`: the immutable [`config::BuildConfiguration`] and its loader
//! - `registry` / `convert`: the converter contract and the format registry
//! - `validate`: pre-build checks that gate the pipeline
//! - `matrix`: deterministic task expansion
//! - `pipeline`: bounded parallel execution and result aggregation
//! - `package`: archive creation from successful results

pub mod config;
pub mod consts;
pub mod convert;
pub mod matrix;
pub mod metadata;
pub mod package;
pub mod pipeline;
pub mod registry;
pub mod theme;
pub mod tool;
pub mod util;
pub mod validate;
