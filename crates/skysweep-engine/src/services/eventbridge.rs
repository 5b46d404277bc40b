//! EventBridge cleanup. Order matters twice over: targets come off a rule
//! before the rule is deleted, and every rule on a bus is gone before the
//! bus itself goes. The default bus is never deleted.

use std::sync::Arc;

use aws_sdk_eventbridge::Client;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::{new_ref, simple_delete};

const DEFAULT_BUS: &str = "default";

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let events = client(task).await;

    let buses = events
        .list_event_buses()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

    let mut follow_ups = Vec::new();
    for bus in buses.event_buses() {
        let Some(bus_name) = bus.name() else { continue };

        let rules = events
            .list_rules()
            .event_bus_name(bus_name)
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        let mut rule_delete_indices = Vec::new();
        for rule in rules.rules() {
            let Some(rule_name) = rule.name() else { continue };

            let targets_index = follow_ups.len();
            follow_ups.push(FollowUp::new(TaskKind::RemoveRuleTargets {
                bus: bus_name.to_string(),
                rule: rule_name.to_string(),
            }));
            let delete_index = follow_ups.len();
            follow_ups.push(
                FollowUp::new(TaskKind::DeleteRule {
                    bus: bus_name.to_string(),
                    rule: rule_name.to_string(),
                })
                .after(targets_index),
            );
            rule_delete_indices.push(delete_index);
        }

        if bus_name != DEFAULT_BUS {
            let mut bus_delete = FollowUp::new(TaskKind::DeleteEventBus {
                bus: bus_name.to_string(),
            });
            for index in rule_delete_indices {
                bus_delete = bus_delete.after(index);
            }
            follow_ups.push(bus_delete);
        }
    }

    let archives = events
        .list_archives()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for archive in archives.archives() {
        if let Some(name) = archive.archive_name() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteEventArchive {
                archive: name.to_string(),
            }));
        }
    }

    Ok(follow_ups)
}

pub async fn remove_rule_targets(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    bus: &str,
    rule: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::EventRule, rule)
        .with_metadata("bus", serde_json::json!(bus));
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::cleared(reference))?;
        return Ok(());
    }

    let events = client(task).await;
    let targets = match events
        .list_targets_by_rule()
        .rule(rule)
        .event_bus_name(bus)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let (code, msg) = aws_code_and_msg(&e);
            if skysweep_core::classify_aws_error(&code)
                == skysweep_core::ErrorDisposition::AlreadyGone
            {
                ctx.ledger
                    .append(LedgerEntry::retired_already_absent(reference))?;
                return Ok(());
            }
            return Err(EngineError::Aws(msg));
        }
    };

    let ids: Vec<String> = targets
        .targets()
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    if !ids.is_empty() {
        let result = retry_aws("remove-targets", &ctx.cancel, || {
            let ids = ids.clone();
            async {
                events
                    .remove_targets()
                    .rule(rule)
                    .event_bus_name(bus)
                    .set_ids(Some(ids))
                    .force(true)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            }
        })
        .await?;
        if matches!(result, AwsOp::AlreadyGone) {
            ctx.ledger
                .append(LedgerEntry::retired_already_absent(reference))?;
            return Ok(());
        }
    }

    reference = reference.with_metadata("targets_removed", serde_json::json!(ids.len()));
    ctx.ledger.append(LedgerEntry::cleared(reference))?;
    Ok(())
}

pub async fn delete_rule(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    bus: &str,
    rule: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::EventRule, rule)
        .with_metadata("bus", serde_json::json!(bus));
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let events = client(task).await;
    let result = retry_aws("delete-rule", &ctx.cancel, || async {
        events
            .delete_rule()
            .name(rule)
            .event_bus_name(bus)
            .force(true)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    match result {
        AwsOp::Done(()) => ctx.ledger.append(LedgerEntry::retired(reference))?,
        AwsOp::AlreadyGone => ctx
            .ledger
            .append(LedgerEntry::retired_already_absent(reference))?,
    }
    Ok(())
}

pub async fn delete_bus(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    bus: &str,
) -> Result<(), EngineError> {
    let events = client(task).await;
    simple_delete(ctx, task, ResourceType::EventBus, bus, "delete-event-bus", || async {
        events
            .delete_event_bus()
            .name(bus)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await
}

pub async fn delete_archive(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    archive: &str,
) -> Result<(), EngineError> {
    let events = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::EventArchive,
        archive,
        "delete-archive",
        || async {
            events
                .delete_archive()
                .archive_name(archive)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}
