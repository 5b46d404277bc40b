//! S3 cleanup. Buckets are global-namespace but region-homed; discovery
//! resolves each bucket's home region and only claims the ones in this
//! task's region.
//!
//! Teardown order is fixed: remove replication, suspend versioning, delete
//! every object version and delete marker, clear subresources, then delete
//! the bucket.

use std::sync::Arc;

use aws_sdk_s3::types::{BucketVersioningStatus, Delete, ObjectIdentifier, VersioningConfiguration};
use aws_sdk_s3::Client;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::new_ref;

const DELETE_BATCH: usize = 1000;

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let s3 = client(task).await;

    let response = s3
        .list_buckets()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

    let mut follow_ups = Vec::new();
    for bucket in response.buckets() {
        let Some(name) = bucket.name() else { continue };

        let home_region = match s3.get_bucket_location().bucket(name).send().await {
            Ok(location) => {
                let constraint = location
                    .location_constraint()
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default();
                // Legacy API quirk: us-east-1 comes back as an empty constraint.
                if constraint.is_empty() {
                    "us-east-1".to_string()
                } else {
                    constraint
                }
            }
            Err(e) => {
                tracing::warn!(bucket = name, error = %aws_code_and_msg(&e).1, "bucket location unresolved, skipping");
                continue;
            }
        };
        if home_region != task.region {
            continue;
        }

        let strip_index = follow_ups.len();
        follow_ups.push(FollowUp::new(TaskKind::StripBucket {
            bucket: name.to_string(),
        }));
        follow_ups.push(
            FollowUp::new(TaskKind::DeleteBucket {
                bucket: name.to_string(),
            })
            .after(strip_index),
        );
    }
    Ok(follow_ups)
}

/// Make a bucket deletable: replication off, versioning suspended, every
/// version and delete marker removed, subresources cleared.
pub async fn strip_bucket(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    bucket: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::S3Bucket, bucket);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::cleared(reference))?;
        return Ok(());
    }

    let s3 = client(task).await;

    // 1. Replication must go before versioning can be suspended.
    let result = retry_aws("delete-bucket-replication", &ctx.cancel, || async {
        s3.delete_bucket_replication()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;
    if matches!(result, AwsOp::AlreadyGone) {
        tracing::debug!(bucket, "no replication configuration");
    }

    // 2. Suspend versioning so deletes stop minting new delete markers.
    let versioning = VersioningConfiguration::builder()
        .status(BucketVersioningStatus::Suspended)
        .build();
    retry_aws("put-bucket-versioning", &ctx.cancel, || {
        let versioning = versioning.clone();
        async {
            s3.put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(versioning)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        }
    })
    .await?;

    // 3. Every version and delete marker.
    let deleted = delete_all_versions(ctx, &s3, bucket).await?;

    // 4. Subresources, best-effort; none of these block bucket deletion on
    // their own, but leftovers confuse reruns.
    clear_subresources(&s3, bucket).await;

    reference = reference.with_metadata("objects_deleted", serde_json::json!(deleted));
    ctx.ledger.append(LedgerEntry::cleared(reference))?;
    Ok(())
}

async fn delete_all_versions(
    ctx: &Arc<WorkerContext>,
    s3: &Client,
    bucket: &str,
) -> Result<usize, EngineError> {
    let mut deleted = 0usize;
    let mut key_marker: Option<String> = None;
    let mut version_marker: Option<String> = None;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut request = s3.list_object_versions().bucket(bucket);
        if let Some(marker) = &key_marker {
            request = request.key_marker(marker);
        }
        if let Some(marker) = &version_marker {
            request = request.version_id_marker(marker);
        }
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let (code, msg) = aws_code_and_msg(&e);
                if code == "NoSuchBucket" {
                    return Ok(deleted);
                }
                return Err(EngineError::Aws(msg));
            }
        };

        let mut identifiers: Vec<ObjectIdentifier> = Vec::new();
        for version in response.versions() {
            if let (Some(key), Some(version_id)) = (version.key(), version.version_id()) {
                if let Ok(id) = ObjectIdentifier::builder()
                    .key(key)
                    .version_id(version_id)
                    .build()
                {
                    identifiers.push(id);
                }
            }
        }
        for marker in response.delete_markers() {
            if let (Some(key), Some(version_id)) = (marker.key(), marker.version_id()) {
                if let Ok(id) = ObjectIdentifier::builder()
                    .key(key)
                    .version_id(version_id)
                    .build()
                {
                    identifiers.push(id);
                }
            }
        }

        for chunk in identifiers.chunks(DELETE_BATCH) {
            let delete = Delete::builder()
                .set_objects(Some(chunk.to_vec()))
                .quiet(true)
                .build()
                .map_err(|e| EngineError::Aws(format!("delete batch: {e}")))?;
            retry_aws("delete-objects", &ctx.cancel, || {
                let delete = delete.clone();
                async {
                    s3.delete_objects()
                        .bucket(bucket)
                        .delete(delete)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| aws_code_and_msg(&e))
                }
            })
            .await?;
            deleted += chunk.len();
        }

        if response.is_truncated() == Some(true) {
            key_marker = response.next_key_marker().map(String::from);
            version_marker = response.next_version_id_marker().map(String::from);
        } else {
            break;
        }
    }

    tracing::info!(bucket, deleted, "object versions removed");
    Ok(deleted)
}

/// Remove policy, notification, lifecycle, CORS, website, encryption,
/// logging, accelerate, and tagging configuration. Failures are logged and
/// ignored.
async fn clear_subresources(s3: &Client, bucket: &str) {
    macro_rules! best_effort {
        ($what:literal, $fut:expr) => {
            if let Err(e) = $fut.await {
                tracing::debug!(bucket, what = $what, error = %aws_code_and_msg(&e).1, "subresource not cleared");
            }
        };
    }

    best_effort!("policy", s3.delete_bucket_policy().bucket(bucket).send());
    best_effort!(
        "notifications",
        s3.put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(
                aws_sdk_s3::types::NotificationConfiguration::builder().build(),
            )
            .send()
    );
    best_effort!(
        "lifecycle",
        s3.delete_bucket_lifecycle().bucket(bucket).send()
    );
    best_effort!("cors", s3.delete_bucket_cors().bucket(bucket).send());
    best_effort!("website", s3.delete_bucket_website().bucket(bucket).send());
    best_effort!(
        "encryption",
        s3.delete_bucket_encryption().bucket(bucket).send()
    );
    best_effort!(
        "logging",
        s3.put_bucket_logging()
            .bucket(bucket)
            .bucket_logging_status(aws_sdk_s3::types::BucketLoggingStatus::builder().build())
            .send()
    );
    best_effort!(
        "accelerate",
        s3.put_bucket_accelerate_configuration()
            .bucket(bucket)
            .accelerate_configuration(
                aws_sdk_s3::types::AccelerateConfiguration::builder()
                    .status(aws_sdk_s3::types::BucketAccelerateStatus::Suspended)
                    .build(),
            )
            .send()
    );
    best_effort!("tagging", s3.delete_bucket_tagging().bucket(bucket).send());
}

pub async fn delete_bucket(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    bucket: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::S3Bucket, bucket);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let s3 = client(task).await;
    let result = retry_aws("delete-bucket", &ctx.cancel, || async {
        s3.delete_bucket()
            .bucket(bucket)
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
    tracing::info!(bucket, "bucket deleted");
    Ok(())
}
