use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{ContainerExecutor, ContainerSpec, ContainerStatus, ExecutorError};

#[derive(Debug, Clone)]
struct Container {
    status: ContainerStatus,
    devices: Vec<String>,
}

/// In-memory fake used by tests and by the integration suite: never shells
/// out, so a test run doesn't need Docker installed.
#[derive(Default)]
pub struct InMemoryExecutor {
    containers: RwLock<HashMap<String, Container>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: simulate an out-of-band `docker rm` on a managed
    /// container, exercising ASG/reconciliation replacement logic.
    pub fn simulate_removed(&self, runtime_id: &str) {
        self.containers.write().unwrap().remove(runtime_id);
    }

    pub fn simulate_unhealthy(&self, runtime_id: &str) {
        if let Some(c) = self.containers.write().unwrap().get_mut(runtime_id) {
            c.status = ContainerStatus::Unhealthy;
        }
    }
}

#[async_trait]
impl ContainerExecutor for InMemoryExecutor {
    async fn create_and_start(&self, spec: ContainerSpec) -> Result<(), ExecutorError> {
        self.containers.write().unwrap().insert(
            spec.runtime_id,
            Container { status: ContainerStatus::Running, devices: Vec::new() },
        );
        Ok(())
    }

    async fn stop(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        let mut containers = self.containers.write().unwrap();
        let container = containers
            .get_mut(runtime_id)
            .ok_or_else(|| ExecutorError::Terminal(runtime_id.to_string()))?;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn start(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        let mut containers = self.containers.write().unwrap();
        let container = containers
            .get_mut(runtime_id)
            .ok_or_else(|| ExecutorError::Terminal(runtime_id.to_string()))?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn remove(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        self.containers.write().unwrap().remove(runtime_id);
        Ok(())
    }

    async fn status(&self, runtime_id: &str) -> Result<ContainerStatus, ExecutorError> {
        Ok(self
            .containers
            .read()
            .unwrap()
            .get(runtime_id)
            .map(|c| c.status.clone())
            .unwrap_or(ContainerStatus::Removed))
    }

    async fn attach_block_device(
        &self,
        runtime_id: &str,
        device: &str,
        _size_gib: u64,
    ) -> Result<(), ExecutorError> {
        let mut containers = self.containers.write().unwrap();
        let container = containers
            .get_mut(runtime_id)
            .ok_or_else(|| ExecutorError::Terminal(runtime_id.to_string()))?;
        container.devices.push(device.to_string());
        Ok(())
    }

    async fn detach_block_device(&self, runtime_id: &str, device: &str) -> Result<(), ExecutorError> {
        let mut containers = self.containers.write().unwrap();
        let container = containers
            .get_mut(runtime_id)
            .ok_or_else(|| ExecutorError::Terminal(runtime_id.to_string()))?;
        container.devices.retain(|d| d != device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_removal_surfaces_as_removed() {
        let exec = InMemoryExecutor::new();
        exec.create_and_start(ContainerSpec {
            runtime_id: "abc".into(),
            image: "nginx".into(),
            labels: vec![],
            user_data: None,
        })
        .await
        .unwrap();
        assert_eq!(exec.status("abc").await.unwrap(), ContainerStatus::Running);
        exec.simulate_removed("abc");
        assert_eq!(exec.status("abc").await.unwrap(), ContainerStatus::Removed);
    }

    #[tokio::test]
    async fn stop_start_round_trip() {
        let exec = InMemoryExecutor::new();
        exec.create_and_start(ContainerSpec {
            runtime_id: "abc".into(),
            image: "nginx".into(),
            labels: vec![],
            user_data: None,
        })
        .await
        .unwrap();
        exec.stop("abc").await.unwrap();
        assert_eq!(exec.status("abc").await.unwrap(), ContainerStatus::Exited);
        exec.start("abc").await.unwrap();
        assert_eq!(exec.status("abc").await.unwrap(), ContainerStatus::Running);
    }
}
