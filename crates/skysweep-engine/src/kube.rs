//! kubectl / aws-cli subprocess driver for EKS tasks.
//!
//! The engine never links a Kubernetes client; it shells out exactly the way
//! an operator would, with the handle's credentials injected through the
//! environment and a deadline on every invocation.

use std::process::Stdio;
use std::time::Duration;

use skysweep_core::CredentialHandle;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::EngineError;

/// Autoscaler objects, in deletion order.
const AUTOSCALER_OBJECTS: [(&str, &str); 7] = [
    ("deployment", "cluster-autoscaler"),
    ("serviceaccount", "cluster-autoscaler"),
    ("clusterrole", "cluster-autoscaler"),
    ("clusterrolebinding", "cluster-autoscaler"),
    ("role", "cluster-autoscaler"),
    ("rolebinding", "cluster-autoscaler"),
    ("secret", "cluster-autoscaler"),
];

pub struct Kubectl {
    access_key: String,
    secret_key: String,
    region: String,
    deadline: Duration,
}

impl Kubectl {
    pub fn for_handle(handle: &CredentialHandle, region: &str, deadline: Duration) -> Self {
        Self {
            access_key: handle.access_key.clone(),
            secret_key: handle.secret_key.clone(),
            region: region.to_string(),
            deadline,
        }
    }

    async fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<std::process::Output, EngineError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .env("AWS_ACCESS_KEY_ID", &self.access_key)
            .env("AWS_SECRET_ACCESS_KEY", &self.secret_key)
            .env("AWS_DEFAULT_REGION", &self.region)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ToolMissing {
                    tool: program.to_string(),
                }
            } else {
                EngineError::Subprocess(format!("{program}: {e}"))
            }
        })?;

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| EngineError::Subprocess(format!("{program} stdin: {e}")))?;
            }
        }

        let output = tokio::time::timeout(self.deadline, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Timeout {
                what: format!("{program} {}", args.join(" ")),
            })?
            .map_err(|e| EngineError::Subprocess(format!("{program}: {e}")))?;
        Ok(output)
    }

    async fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<String, EngineError> {
        let output = self.run(program, args, stdin).await?;
        if !output.status.success() {
            return Err(EngineError::Subprocess(format!(
                "{program} {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Point the local kubeconfig at the cluster.
    pub async fn update_kubeconfig(&self, cluster: &str) -> Result<(), EngineError> {
        self.run_checked(
            "aws",
            &[
                "eks",
                "update-kubeconfig",
                "--name",
                cluster,
                "--region",
                &self.region,
            ],
            None,
        )
        .await?;
        tracing::debug!(cluster, "kubeconfig updated");
        Ok(())
    }

    /// Cheap connectivity probe before issuing real operations.
    pub async fn verify_connectivity(&self) -> Result<(), EngineError> {
        self.run_checked("kubectl", &["get", "namespace", "kube-system"], None)
            .await
            .map_err(|e| EngineError::Kube(format!("cluster unreachable: {e}")))?;
        Ok(())
    }

    /// Delete the cluster-autoscaler objects in order, tolerating absences.
    pub async fn delete_autoscaler_objects(&self) -> Result<(), EngineError> {
        for (kind, name) in AUTOSCALER_OBJECTS {
            self.run_checked(
                "kubectl",
                &[
                    "delete",
                    kind,
                    name,
                    "-n",
                    "kube-system",
                    "--ignore-not-found",
                ],
                None,
            )
            .await?;
            tracing::debug!(kind, name, "autoscaler object deleted");
        }
        Ok(())
    }

    /// Apply the aws-auth ConfigMap with a fallback chain:
    /// apply → replace → delete-and-create → server-side apply.
    /// Returns the strategy that stuck.
    pub async fn apply_configmap(&self, manifest: &str) -> Result<&'static str, EngineError> {
        if self
            .run_checked("kubectl", &["apply", "-f", "-"], Some(manifest))
            .await
            .is_ok()
        {
            return Ok("apply");
        }
        tracing::warn!("kubectl apply failed, trying replace");

        if self
            .run_checked("kubectl", &["replace", "-f", "-"], Some(manifest))
            .await
            .is_ok()
        {
            return Ok("replace");
        }
        tracing::warn!("kubectl replace failed, trying delete-and-create");

        self.run_checked(
            "kubectl",
            &[
                "delete",
                "configmap",
                "aws-auth",
                "-n",
                "kube-system",
                "--ignore-not-found",
            ],
            None,
        )
        .await?;
        if self
            .run_checked("kubectl", &["create", "-f", "-"], Some(manifest))
            .await
            .is_ok()
        {
            return Ok("delete-and-create");
        }
        tracing::warn!("kubectl create failed, trying server-side apply");

        self.run_checked(
            "kubectl",
            &["apply", "--server-side", "--force-conflicts", "-f", "-"],
            Some(manifest),
        )
        .await?;
        Ok("server-side-apply")
    }

    /// Read back `mapUsers` to confirm the ConfigMap landed.
    pub async fn read_map_users(&self) -> Result<String, EngineError> {
        self.run_checked(
            "kubectl",
            &[
                "get",
                "configmap",
                "aws-auth",
                "-n",
                "kube-system",
                "-o",
                "jsonpath={.data.mapUsers}",
            ],
            None,
        )
        .await
        .map_err(|e| EngineError::Kube(format!("aws-auth verification failed: {e}")))
    }
}
