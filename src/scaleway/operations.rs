//! Polling of asynchronous operations until they settle.

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::provider::{Operation, ProviderError};

use super::types::{OperationRef, Progress, TaskEnvelope, VolumeBody};
use super::{HTTP_CLIENT, ScalewayProvider, Target};

impl ScalewayProvider {
    pub(super) async fn wait_all(&self, operations: &[Operation]) -> Result<(), ProviderError> {
        for operation in operations {
            self.wait_one(operation).await?;
        }
        Ok(())
    }

    async fn wait_one(&self, operation: &Operation) -> Result<(), ProviderError> {
        let reference = OperationRef::parse(&operation.id).ok_or_else(|| {
            ProviderError::api(format!("unrecognised operation handle {}", operation.id))
        })?;
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            match self.progress(&reference).await? {
                Progress::Done => {
                    debug!(operation = %operation.description, "operation completed");
                    return Ok(());
                }
                Progress::Failed(message) => {
                    return Err(ProviderError::OperationFailed {
                        operation: operation.description.clone(),
                        message,
                    });
                }
                Progress::Pending => {}
            }

            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout {
                    operation: operation.description.clone(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn progress(&self, reference: &OperationRef<'_>) -> Result<Progress, ProviderError> {
        match *reference {
            OperationRef::Task(task) => {
                let url = Self::instance_url(&self.zone, &format!("tasks/{task}"));
                let envelope: TaskEnvelope = self
                    .fetch(HTTP_CLIENT.get(&url), Target::new("task", task))
                    .await?;
                Ok(Progress::of_task(&envelope.task.status))
            }
            OperationRef::Volume(volume) => {
                let url = Self::block_url(&self.zone, &format!("volumes/{volume}"));
                let body: VolumeBody = self
                    .fetch(HTTP_CLIENT.get(&url), Target::new("volume", volume))
                    .await?;
                Ok(Progress::of_volume(&body.status))
            }
        }
    }
}
