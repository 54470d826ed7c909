//! Container execution abstraction. `dc2-engine` only ever talks to
//! `dyn ContainerExecutor`; this crate provides an in-memory fake for tests
//! and a Docker-CLI-backed implementation for the running binary.

mod docker;
mod memory;

pub use docker::DockerExecutor;
pub use memory::InMemoryExecutor;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    /// The container no longer exists (e.g. an out-of-band `docker rm`).
    Removed,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub runtime_id: String,
    pub image: String,
    pub labels: Vec<(String, String)>,
    pub user_data: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("transient executor failure: {0}")]
    Transient(String),
    #[error("container {0} is gone")]
    Terminal(String),
}

impl ExecutorError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutorError::Terminal(_))
    }
}

/// Everything the lifecycle engine needs from the container runtime.
#[async_trait]
pub trait ContainerExecutor: Send + Sync {
    async fn create_and_start(&self, spec: ContainerSpec) -> Result<(), ExecutorError>;
    async fn stop(&self, runtime_id: &str) -> Result<(), ExecutorError>;
    async fn start(&self, runtime_id: &str) -> Result<(), ExecutorError>;
    async fn remove(&self, runtime_id: &str) -> Result<(), ExecutorError>;
    async fn status(&self, runtime_id: &str) -> Result<ContainerStatus, ExecutorError>;

    /// Exposes a backing block device under `device` inside the instance
    /// container (volume attach).
    async fn attach_block_device(
        &self,
        runtime_id: &str,
        device: &str,
        size_gib: u64,
    ) -> Result<(), ExecutorError>;

    /// Inverse of `attach_block_device` (volume detach).
    async fn detach_block_device(&self, runtime_id: &str, device: &str) -> Result<(), ExecutorError>;
}
