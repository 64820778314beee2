//! Detecting whether a cluster was provisioned before
//!
//! There is no dedicated state marker. A cluster counts as existing when its
//! Terraform state holds at least one output, which is true after any
//! successful apply because every platform exposes outputs. A platform with
//! no outputs at all would always look like a fresh cluster.

use tracing::{debug, Instrument};
use trellis_common::{DiagnosticContext, Error, Result};

use crate::terraform::Executor;

/// Whether `terraform apply` has completed at least once for this executor
///
/// Query failures are errors, never a guess at either answer.
pub async fn cluster_exists(executor: &dyn Executor, ctx: &DiagnosticContext) -> Result<bool> {
    let outputs = executor
        .outputs()
        .instrument(ctx.span())
        .await
        .map_err(|e| Error::ExistenceQuery { source: Box::new(e) }.with_context(ctx))?;

    debug!(outputs = outputs.len(), "queried terraform outputs");
    Ok(!outputs.is_empty())
}
