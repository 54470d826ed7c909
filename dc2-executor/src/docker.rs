use async_trait::async_trait;
use tokio::process::Command;

use crate::{ContainerExecutor, ContainerSpec, ContainerStatus, ExecutorError};

/// Shells out to the `docker` CLI. Containers are named after the
/// instance's runtime ID so lookups never need a side table.
pub struct DockerExecutor {
    loop_device_dir: String,
}

impl DockerExecutor {
    pub fn new(loop_device_dir: impl Into<String>) -> Self {
        Self { loop_device_dir: loop_device_dir.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, ExecutorError> {
        Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| ExecutorError::Transient(format!("docker {:?}: {e}", args)))
    }
}

fn classify_failure(stderr: &str, runtime_id: &str) -> ExecutorError {
    if stderr.contains("No such container") || stderr.contains("no container") {
        ExecutorError::Terminal(runtime_id.to_string())
    } else {
        ExecutorError::Transient(stderr.to_string())
    }
}

#[async_trait]
impl ContainerExecutor for DockerExecutor {
    async fn create_and_start(&self, spec: ContainerSpec) -> Result<(), ExecutorError> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.runtime_id.clone(),
            "--label".to_string(),
            "dc2:enabled=true".to_string(),
            "--label".to_string(),
            format!("dc2:instance-id={}", spec.runtime_id),
        ];
        for (k, v) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{k}={v}"));
        }
        if let Some(user_data) = &spec.user_data {
            args.push("--label".to_string());
            args.push(format!("dc2:user-data={user_data}"));
        }
        args.push(spec.image.clone());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&args_ref).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), &spec.runtime_id));
        }
        tracing::info!(runtime_id = %spec.runtime_id, "container created");
        Ok(())
    }

    async fn stop(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        let output = self.run(&["stop", runtime_id]).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), runtime_id));
        }
        Ok(())
    }

    async fn start(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        let output = self.run(&["start", runtime_id]).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), runtime_id));
        }
        Ok(())
    }

    async fn remove(&self, runtime_id: &str) -> Result<(), ExecutorError> {
        let output = self.run(&["rm", "-f", runtime_id]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("No such container") {
                return Err(ExecutorError::Transient(stderr.to_string()));
            }
        }
        Ok(())
    }

    async fn status(&self, runtime_id: &str) -> Result<ContainerStatus, ExecutorError> {
        let output = self
            .run(&["inspect", "--format", "{{.State.Status}} {{.State.Health.Status}}", runtime_id])
            .await?;
        if !output.status.success() {
            return Ok(ContainerStatus::Removed);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut parts = stdout.split_whitespace();
        let state = parts.next().unwrap_or("");
        let health = parts.next().unwrap_or("");
        Ok(match (state, health) {
            (_, "unhealthy") => ContainerStatus::Unhealthy,
            ("running", _) => ContainerStatus::Running,
            ("exited", _) | ("dead", _) => ContainerStatus::Exited,
            _ => ContainerStatus::Removed,
        })
    }

    async fn attach_block_device(
        &self,
        runtime_id: &str,
        device: &str,
        size_gib: u64,
    ) -> Result<(), ExecutorError> {
        let backing_file = format!("{}/{}.img", self.loop_device_dir, runtime_id.replace('/', "_"));
        let output = self
            .run(&[
                "exec",
                runtime_id,
                "sh",
                "-c",
                &format!(
                    "fallocate -l {size_gib}G {backing_file} 2>/dev/null || \
                     dd if=/dev/zero of={backing_file} bs=1M count={size} 2>/dev/null; \
                     losetup -f {backing_file} 2>/dev/null; \
                     mknod {device} b 7 0 2>/dev/null || true",
                    size_gib = size_gib,
                    backing_file = backing_file,
                    device = device,
                    size = size_gib * 1024,
                ),
            ])
            .await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), runtime_id));
        }
        Ok(())
    }

    async fn detach_block_device(&self, runtime_id: &str, device: &str) -> Result<(), ExecutorError> {
        let output = self
            .run(&["exec", runtime_id, "sh", "-c", &format!("rm -f {device}")])
            .await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), runtime_id));
        }
        Ok(())
    }
}
