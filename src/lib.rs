//! Middle-end passes of the compiler. A resolved [`ast::Program`] goes in,
//! a program free of complex primitive types (and optionally instrumented for
//! the copying collector) comes out.

pub mod ast;
pub mod error;
pub mod index;
pub mod intern;
pub mod middle;

pub use ast::Program;
pub use error::InternalError;
pub use middle::{PipelineConfig, PipelineReport, SubstitutionPolicy, run_pipeline};
