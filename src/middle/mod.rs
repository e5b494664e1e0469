//! Whole-program passes over the resolved AST. Each pass rewrites the
//! [`Program`] in place and runs at most once, in the fixed order given by
//! [`run_pipeline`]: complex types are lowered to records first, then (if
//! enabled) functions are instrumented with collector root registration.

use log::info;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{ast::Program, error::InternalError};

pub mod complex_to_record;
pub mod copy_collect;
pub mod verify;

pub use complex_to_record::{LoweringReport, lower_complex_types};
pub use copy_collect::{FunctionRoots, RootSetReport, instrument_root_sets};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    ComplexToRecord,
    CopyCollection,
}

/// What lowering does with a data class instantiated over a complex type that
/// has no record counterpart
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionPolicy {
    /// Abort with [`InternalError::UnknownSubstitution`]
    #[default]
    Fail,
    /// Clear the slot to "no type" and log a warning
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Instrument functions for the copying collector
    pub copy_collect: bool,
    /// Size of the memory region handed to the collector at startup
    pub collector_region_bytes: i64,
    pub unknown_substitution: SubstitutionPolicy,
    /// Check the program's invariants after every pass
    pub verify: bool,
}

/// 20 MiB
pub const DEFAULT_COLLECTOR_REGION_BYTES: i64 = 20 * 1024 * 1024;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            copy_collect: false,
            collector_region_bytes: DEFAULT_COLLECTOR_REGION_BYTES,
            unknown_substitution: SubstitutionPolicy::Fail,
            verify: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub lowering: LoweringReport,
    pub root_sets: Option<RootSetReport>,
}

impl Program {
    /// Records that `pass` is about to rewrite the program, refusing to run a
    /// pass twice
    pub(crate) fn begin_pass(&mut self, pass: PassKind) -> Result<(), InternalError> {
        if !self.applied_passes.insert(pass) {
            return Err(InternalError::PassRepeated(pass));
        }

        Ok(())
    }
}

pub fn run_pipeline(program: &mut Program, config: &PipelineConfig) -> Result<PipelineReport, InternalError> {
    let lowering = lower_complex_types(program, config.unknown_substitution)?;
    info!(
        "{}: {} temporaries, {} declarations retyped, {} operations rewritten",
        PassKind::ComplexToRecord,
        lowering.temporaries,
        lowering.retyped_declarations,
        lowering.rewritten_operations
    );

    if config.verify {
        verify::verify_program(program)?;
    }

    let root_sets = if config.copy_collect {
        let report = instrument_root_sets(program, config.collector_region_bytes)?;
        info!(
            "{}: {} roots in {} functions, {} module roots",
            PassKind::CopyCollection,
            report.registered(),
            report.functions.iter().filter(|function| function.registered > 0).count(),
            report.module_roots
        );

        if config.verify {
            verify::verify_program(program)?;
        }

        Some(report)
    } else {
        None
    };

    Ok(PipelineReport { lowering, root_sets })
}
