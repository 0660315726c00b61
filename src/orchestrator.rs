//! Container orchestrator seam.
//!
//! The core never schedules compute itself; it asks an [`Orchestrator`] to
//! bring a sandbox pod up or down and treats the call as opaque.
//! `KubectlOrchestrator` is the shipped implementation and drives the
//! cluster through the `kubectl` CLI.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

/// Everything the orchestrator needs to start one sandbox pod.
#[derive(Debug, Clone)]
pub struct SpinUpParams {
    pub lab_id: String,
    pub language: String,
    pub code_link: String,
    pub namespace: String,
}

impl SpinUpParams {
    pub fn app_name(&self) -> String {
        format!("{}-{}", self.language, self.lab_id)
    }
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn spin_up(&self, params: &SpinUpParams) -> anyhow::Result<()>;
    async fn tear_down(&self, lab_id: &str, language: &str, namespace: &str)
        -> anyhow::Result<()>;
}

/// Drives the cluster via the `kubectl` CLI.
pub struct KubectlOrchestrator;

#[async_trait]
impl Orchestrator for KubectlOrchestrator {
    async fn spin_up(&self, params: &SpinUpParams) -> anyhow::Result<()> {
        let app = params.app_name();
        let image = format!("questlab/runtime-{}:latest", params.language);
        info!(lab_id = params.lab_id, app, "spinning up sandbox pod");

        let output = Command::new("kubectl")
            .args([
                "-n",
                &params.namespace,
                "run",
                &app,
                "--image",
                &image,
                "--labels",
                &format!("app={app},lab={}", params.lab_id),
                "--env",
                &format!("LAB_ID={}", params.lab_id),
                "--env",
                &format!("LAB_LANGUAGE={}", params.language),
                "--env",
                &format!("LAB_CODE_LINK={}", params.code_link),
                "--restart",
                "Never",
            ])
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "kubectl run failed for {}: {}",
                app,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn tear_down(
        &self,
        lab_id: &str,
        language: &str,
        namespace: &str,
    ) -> anyhow::Result<()> {
        let app = format!("{language}-{lab_id}");
        info!(lab_id, app, "tearing down sandbox pod");

        let output = Command::new("kubectl")
            .args(["-n", namespace, "delete", "pod", &app, "--ignore-not-found"])
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "kubectl delete failed for {}: {}",
                app,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_joins_language_and_lab_id() {
        let params = SpinUpParams {
            lab_id: "lab-1".into(),
            language: "go".into(),
            code_link: "code/go/lab-1".into(),
            namespace: "questlab".into(),
        };
        assert_eq!(params.app_name(), "go-lab-1");
    }
}
