//! Subcommand drivers: resolve credentials, run the engine, emit reports,
//! and map outcomes to exit codes (0 clean, 1 partial, 2 all-fail,
//! 3 cancelled, 4 configuration error).

use std::io::Write;
use std::path::Path;

use skysweep_advisor::{AdvisorOptions, AnalyzeFilters, DiskCache, SpotAdvisor, WorkloadClass};
use skysweep_config::{AccountsConfig, AmiMapping, IamCredentialsFile};
use skysweep_core::task::Service;
use skysweep_core::CredentialHandle;
use skysweep_engine::planner::Intent;
use skysweep_engine::{credentials, EngineError, SessionOptions, SessionSummary};
use skysweep_report::{build_report, SessionFacts};
use tokio_util::sync::CancellationToken;

use crate::args::{Commands, EksClusterArgs, SessionArgs};

const EXIT_CONFIG: i32 = 4;

pub async fn run(command: Commands) -> i32 {
    let result = match command {
        Commands::Provision {
            session,
            ec2,
            asg,
            instance_type,
            ami_mapping,
        } => provision(session, ec2, asg, instance_type, &ami_mapping).await,

        Commands::CleanupEc2(s) => cleanup(s, Service::Ec2).await,
        Commands::CleanupS3(s) => cleanup(s, Service::S3).await,
        Commands::CleanupEks(s) => cleanup(s, Service::Eks).await,
        Commands::CleanupEventbridge(s) => cleanup(s, Service::EventBridge).await,
        Commands::CleanupRedshift(s) => cleanup(s, Service::Redshift).await,
        Commands::CleanupStepfunctions(s) => cleanup(s, Service::StepFunctions).await,
        Commands::CleanupSagemaker(s) => cleanup(s, Service::SageMaker).await,
        Commands::CleanupIam(s) => cleanup(s, Service::Iam).await,
        Commands::CleanupMq(s) => cleanup(s, Service::Mq).await,
        Commands::CleanupFsx(s) => cleanup(s, Service::Fsx).await,
        Commands::CleanupStoragegateway(s) => cleanup(s, Service::StorageGateway).await,

        Commands::Nuke {
            session,
            nuke_config,
        } => nuke(session, &nuke_config).await,

        Commands::EksDeleteAutoscaler { session, eks } => {
            eks_session(session, eks, /* configure_auth = */ false).await
        }
        Commands::EksConfigureAuth { session, eks } => {
            eks_session(session, eks, /* configure_auth = */ true).await
        }

        Commands::Rollback {
            session,
            session_id,
        } => rollback(session, &session_id).await,

        Commands::Advise {
            session,
            advise_region,
            workload,
            target_vcpu,
            top,
        } => advise(session, advise_region, &workload, target_vcpu, top).await,

        Commands::Dashboard {
            service,
            output_dir,
        } => dashboard(&service, &output_dir),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            error_exit_code(&e)
        }
    }
}

fn error_exit_code(error: &EngineError) -> i32 {
    match error {
        EngineError::Config(_)
        | EngineError::Core(_)
        | EngineError::NoValidCredentials
        | EngineError::InvalidArgument(_)
        | EngineError::NonInteractiveRefusal { .. }
        | EngineError::ProductionGuard { .. }
        | EngineError::TooManyResources { .. } => EXIT_CONFIG,
        EngineError::Cancelled => 3,
        _ => 2,
    }
}

/// One confirmation gate for every destructive command. `--yes` satisfies
/// it; `--non-interactive` without `--yes` refuses rather than prompting.
fn confirm_destructive(session: &SessionArgs, what: &str) -> Result<(), EngineError> {
    if session.yes || session.dry_run {
        return Ok(());
    }
    if session.non_interactive {
        return Err(EngineError::NonInteractiveRefusal {
            action: what.to_string(),
        });
    }

    print!("About to {what}. Type 'yes' to proceed: ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() || answer.trim() != "yes" {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

/// On a partial or failed session, offer an interactive rollback unless the
/// engine already handled it (`--auto-rollback`) or prompting is forbidden.
async fn maybe_offer_rollback(
    session: &SessionArgs,
    handles: &[CredentialHandle],
    summary: &SessionSummary,
) {
    if summary.dry_run
        || summary.counts.failed == 0
        || summary.cancelled
        || session.auto_rollback
        || session.non_interactive
    {
        return;
    }

    print!(
        "Session {} ended with {} failures. Roll back created resources? (yes/no): ",
        summary.session_id, summary.counts.failed
    );
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() || answer.trim() != "yes" {
        return;
    }

    match skysweep_engine::rollback_session(
        &session.output_dir,
        &summary.session_id,
        handles,
        &CancellationToken::new(),
    )
    .await
    {
        Ok(result) => println!(
            "rollback: {} retired, {} failed",
            result.retired, result.failed
        ),
        Err(e) => eprintln!("rollback failed: {e}"),
    }
}

/// Resolve and validate the credential set for a session.
async fn load_handles(session: &SessionArgs) -> Result<Vec<CredentialHandle>, EngineError> {
    let handles = match &session.iam_credentials {
        Some(path) => {
            let mut file = if path.as_os_str().is_empty() {
                IamCredentialsFile::load_newest(Path::new("."))?.0
            } else {
                IamCredentialsFile::load(path)?
            };
            if !session.accounts.is_empty() {
                file.accounts
                    .retain(|name, _| session.accounts.contains(name));
            }
            credentials::iam_handles(&file, "all")?
        }
        None => {
            let mut config = AccountsConfig::load(&session.config)?;
            if !session.accounts.is_empty() {
                config
                    .accounts
                    .retain(|name, _| session.accounts.contains(name));
            }
            if config.accounts.is_empty() {
                return Err(EngineError::NoValidCredentials);
            }
            if !session.regions.is_empty() {
                config.user_settings.user_regions = session.regions.clone();
            }
            credentials::root_handles(&config, "all", "all")?
        }
    };

    credentials::validate_all(handles).await
}

fn session_options(session: &SessionArgs) -> SessionOptions {
    SessionOptions {
        dry_run: session.dry_run,
        workers: session.workers,
        max_resources: session.max_resources,
        allow_production: session.allow_production,
        auto_rollback: session.auto_rollback,
        output_dir: session.output_dir.clone(),
        ..Default::default()
    }
}

/// Emit reports, the session log, and the final console summary; returns
/// the exit code.
fn finish(session: &SessionArgs, service: &str, summary: SessionSummary) -> i32 {
    let report = build_report(
        SessionFacts {
            session_id: summary.session_id.to_string(),
            started_at: summary.started_at,
            ended_at: summary.ended_at,
            user: summary.user.clone(),
            dry_run: summary.dry_run,
        },
        summary.entries.clone(),
    );
    match skysweep_report::OutputLayout::create(&session.output_dir, service) {
        Ok(layout) => {
            if let Err(e) = skysweep_report::write_all(&layout, &report) {
                tracing::error!(error = %e, "report generation failed");
            }
            let log = format!(
                "{} session {} user={} dry_run={} succeeded={} failed={} skipped={}\n",
                summary.ended_at,
                summary.session_id,
                summary.user,
                summary.dry_run,
                summary.counts.succeeded,
                summary.counts.failed,
                summary.counts.skipped,
            );
            let log_path = layout
                .log_dir
                .join(format!("session_{}.log", summary.session_id));
            if let Err(e) = std::fs::write(&log_path, log) {
                tracing::warn!(error = %e, "session log not written");
            }
        }
        Err(e) => tracing::error!(error = %e, "report layout creation failed"),
    }

    println!(
        "session {}: {} succeeded, {} failed, {} skipped (ledger: {})",
        summary.session_id,
        summary.counts.succeeded,
        summary.counts.failed,
        summary.counts.skipped,
        summary.ledger_path.display()
    );
    if let Some(rollback) = &summary.rollback {
        println!(
            "auto-rollback: {} retired, {} failed",
            rollback.retired, rollback.failed
        );
    }
    summary.exit_code()
}

async fn provision(
    session: SessionArgs,
    ec2: bool,
    asg: bool,
    instance_type: Option<String>,
    ami_mapping: &Path,
) -> Result<i32, EngineError> {
    let mapping = AmiMapping::load(ami_mapping)?;
    let handles = load_handles(&session).await?;

    // Instance type is chosen once against the first handle's region and
    // replicated to every task.
    let instance_type = match instance_type {
        Some(t) => t,
        None => {
            let first = &handles[0];
            let region = first.regions.first().cloned().unwrap_or_default();
            pick_instance_type(&session, first, &region).await?
        }
    };
    tracing::info!(instance_type, "instance type selected");

    let mut ami_by_region = std::collections::BTreeMap::new();
    for handle in &handles {
        for region in &handle.regions {
            if !ami_by_region.contains_key(region) {
                ami_by_region.insert(region.clone(), mapping.ami_for(region)?.to_string());
            }
        }
    }

    let summary = skysweep_engine::run_session(
        handles.clone(),
        Intent::Provision {
            create_ec2: ec2 || !asg, // plain `provision` defaults to EC2
            create_asg: asg,
            instance_type,
            ami_by_region,
        },
        session_options(&session),
    )
    .await?;
    maybe_offer_rollback(&session, &handles, &summary).await;
    Ok(finish(&session, "ec2", summary))
}

async fn pick_instance_type(
    session: &SessionArgs,
    handle: &CredentialHandle,
    region: &str,
) -> Result<String, EngineError> {
    let sdk = skysweep_engine::sdk::sdk_config(handle, region).await;
    let cache = DiskCache::open(session.output_dir.join("aws").join("spot_cache"))?;
    let advisor = SpotAdvisor::new(
        aws_sdk_ec2::Client::new(&sdk),
        cache,
        AdvisorOptions {
            fail_fast: !session.no_fail_fast,
            ..Default::default()
        },
    );
    let ranked = advisor.analyze(region, &AnalyzeFilters::default()).await?;
    ranked
        .first()
        .map(|a| a.instance_type.clone())
        .ok_or_else(|| EngineError::Advisor(skysweep_advisor::AdvisorError::NoCandidates {
            region: region.to_string(),
        }))
}

async fn cleanup(session: SessionArgs, service: Service) -> Result<i32, EngineError> {
    confirm_destructive(&session, &format!("delete {service} resources"))?;
    let handles = load_handles(&session).await?;
    let summary = skysweep_engine::run_session(
        handles.clone(),
        Intent::Cleanup {
            services: vec![service],
        },
        session_options(&session),
    )
    .await?;
    maybe_offer_rollback(&session, &handles, &summary).await;
    Ok(finish(&session, service.as_str(), summary))
}

async fn nuke(session: SessionArgs, nuke_config: &Path) -> Result<i32, EngineError> {
    confirm_destructive(&session, "run cloud-nuke against the selected accounts")?;
    let handles = load_handles(&session).await?;
    let summary = skysweep_engine::run_session(
        handles,
        Intent::CloudNuke {
            config_path: nuke_config.display().to_string(),
        },
        session_options(&session),
    )
    .await?;
    Ok(finish(&session, "cloudnuke", summary))
}

async fn eks_session(
    session: SessionArgs,
    eks: EksClusterArgs,
    configure_auth: bool,
) -> Result<i32, EngineError> {
    if !configure_auth {
        confirm_destructive(&session, "delete cluster autoscalers")?;
    }
    let handles = load_handles(&session).await?;
    let clusters: Vec<(String, String)> = eks
        .clusters
        .iter()
        .map(|c| (c.clone(), eks.region.clone()))
        .collect();

    let intent = if configure_auth {
        Intent::EksAuthConfigure { clusters }
    } else {
        Intent::EksAutoscalerDelete { clusters }
    };
    let summary =
        skysweep_engine::run_session(handles, intent, session_options(&session)).await?;
    Ok(finish(&session, "eks", summary))
}

async fn rollback(session: SessionArgs, session_id: &str) -> Result<i32, EngineError> {
    confirm_destructive(&session, &format!("roll back session {session_id}"))?;
    let handles = load_handles(&session).await?;
    let summary = skysweep_engine::rollback_session(
        &session.output_dir,
        &skysweep_core::SessionId(session_id.to_string()),
        &handles,
        &CancellationToken::new(),
    )
    .await?;

    println!(
        "rollback of {session_id}: {} retired, {} failed",
        summary.retired, summary.failed
    );
    Ok(if summary.failed == 0 { 0 } else { 1 })
}

async fn advise(
    session: SessionArgs,
    advise_region: Option<String>,
    workload: &str,
    target_vcpu: i32,
    top: usize,
) -> Result<i32, EngineError> {
    let workload: WorkloadClass = workload.parse().map_err(EngineError::InvalidArgument)?;
    let handles = load_handles(&session).await?;
    let handle = &handles[0];
    let region = advise_region
        .or_else(|| handle.regions.first().cloned())
        .ok_or(EngineError::NoValidCredentials)?;

    let sdk = skysweep_engine::sdk::sdk_config(handle, &region).await;
    let cache = DiskCache::open(session.output_dir.join("aws").join("spot_cache"))?;
    let advisor = SpotAdvisor::new(
        aws_sdk_ec2::Client::new(&sdk),
        cache,
        AdvisorOptions {
            fail_fast: !session.no_fail_fast,
            top_n: top,
            ..Default::default()
        },
    );
    let ranked = advisor
        .analyze(
            &region,
            &AnalyzeFilters {
                workload,
                target_capacity_vcpu: target_vcpu,
                ..Default::default()
            },
        )
        .await?;

    println!(
        "{:<4} {:<16} {:>5} {:>8} {:>10} {:>6} {:>11} {:>6}",
        "rank", "type", "vcpu", "mem GiB", "price/hr", "band", "confidence", "flags"
    );
    for (rank, analysis) in ranked.iter().enumerate() {
        println!(
            "{:<4} {:<16} {:>5} {:>8.1} {:>10.4} {:>6} {:>10.1}% {:>6}",
            rank + 1,
            analysis.instance_type,
            analysis.vcpus,
            analysis.memory_gb,
            analysis.avg_price,
            analysis.interruption_band,
            analysis.confidence,
            if analysis.degraded { "degr" } else { "" }
        );
    }
    Ok(0)
}

fn dashboard(service: &str, output_dir: &Path) -> Result<i32, EngineError> {
    let layout = skysweep_report::OutputLayout::create(output_dir, service)
        .map_err(|e| EngineError::Ledger(e.to_string()))?;
    skysweep_report::write_dashboard(
        &layout.json_dir,
        &layout.html_dir,
        skysweep_report::DEFAULT_SESSION_LIMIT,
    )
    .map_err(|e| EngineError::Ledger(e.to_string()))?;
    println!("dashboard written to {}", layout.html_dir.display());
    Ok(0)
}
