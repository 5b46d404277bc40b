//! Whole-account sweep through the external cloud-nuke binary.

use std::sync::Arc;

use skysweep_core::{LedgerEntry, ResourceType, Task};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::nuke::PromptedTool;
use crate::services::new_ref;

pub async fn run(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    config_path: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::Account, &task.handle.account_id)
        .with_metadata("tool", serde_json::json!("cloud-nuke"));
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::cleared(reference))?;
        return Ok(());
    }

    let tool = PromptedTool {
        program: "cloud-nuke".to_string(),
        args: vec![
            "aws".to_string(),
            "--region".to_string(),
            task.region.clone(),
            "--config".to_string(),
            config_path.to_string(),
        ],
        envs: vec![
            ("AWS_ACCESS_KEY_ID".to_string(), task.handle.access_key.clone()),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                task.handle.secret_key.clone(),
            ),
            ("AWS_DEFAULT_REGION".to_string(), task.region.clone()),
        ],
    };

    let run = tool.run(&ctx.nuke, &ctx.cancel).await?;
    if run.exit_code != Some(0) {
        ctx.ledger
            .append(LedgerEntry::failed(reference, "cloud-nuke-nonzero"))?;
        return Err(EngineError::Subprocess(format!(
            "cloud-nuke exited with {:?}: {}",
            run.exit_code,
            run.output_tail.trim()
        )));
    }

    reference = reference
        .with_metadata("confirmation_sent", serde_json::json!(run.confirmation_sent))
        .with_metadata("force_sent", serde_json::json!(run.force_sent));
    ctx.ledger.append(LedgerEntry::cleared(reference))?;
    tracing::info!(account = %task.handle.account_name, region = %task.region, "cloud-nuke sweep complete");
    Ok(())
}
