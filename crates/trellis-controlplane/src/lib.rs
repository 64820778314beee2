//! Control-plane convergence for Trellis
//!
//! After infrastructure is applied, every control-plane component is brought
//! to its desired state through Helm: installed atomically when its release
//! is missing, then always upgraded atomically against the values the
//! infrastructure currently reports.

#![deny(missing_docs)]

pub mod chart;
pub mod engine;
pub mod updater;
pub mod values;

#[cfg(test)]
mod testing;

pub use chart::{Chart, ChartError, ChartMetadata, ChartSource, DirChartSource};
pub use engine::{
    ActionContext, DeploymentEngine, EngineError, HelmCli, InstallOptions, UpgradeOptions,
};
pub use updater::{ComponentState, ControlplaneUpdater};
pub use values::{parse_values, read_values, values_output_name, Values};
