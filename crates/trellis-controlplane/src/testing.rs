//! Test doubles shared by unit tests

use std::path::PathBuf;

use serde_json::Value;
use trellis_infra::terraform::ExecutorError;
use trellis_infra::{ApplyReport, Executor, Outputs};

/// Executor serving a fixed set of outputs
pub(crate) struct StaticOutputs(pub(crate) Outputs);

impl StaticOutputs {
    pub(crate) fn single(name: &str, value: Value) -> Self {
        let mut map = Outputs::new();
        map.insert(name.to_string(), value);
        Self(map)
    }
}

#[async_trait::async_trait]
impl Executor for StaticOutputs {
    fn working_dir(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }

    async fn init(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn outputs(&self) -> Result<Outputs, ExecutorError> {
        Ok(self.0.clone())
    }

    async fn output(&self, name: &str) -> Result<Value, ExecutorError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::OutputNotFound(name.to_string()))
    }

    async fn apply(&self) -> Result<ApplyReport, ExecutorError> {
        Ok(ApplyReport::default())
    }

    async fn destroy(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}
