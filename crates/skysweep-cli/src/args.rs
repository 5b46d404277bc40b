use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "skysweep",
    about = "Multi-account AWS provisioning and reclamation engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every session-running subcommand.
#[derive(Args, Clone)]
pub struct SessionArgs {
    /// Simulate: no AWS mutations, ledger written with simulated ids.
    #[arg(long)]
    pub dry_run: bool,

    /// Abort if the expected resource count exceeds this.
    #[arg(long, default_value_t = 50)]
    pub max_resources: usize,

    /// Worker pool size (1-20).
    #[arg(long, default_value_t = 5)]
    pub workers: usize,

    /// Accounts config file.
    #[arg(long, default_value = "aws_accounts_config.json", env = "SKYSWEEP_CONFIG")]
    pub config: PathBuf,

    /// IAM credentials file; when set, sessions run as the generated IAM
    /// users instead of account roots. Defaults to the newest
    /// iam_users_credentials_*.json in the working directory when the flag
    /// is given without a value.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub iam_credentials: Option<PathBuf>,

    /// Region to operate in (repeatable). Defaults to the configured list.
    #[arg(long = "region")]
    pub regions: Vec<String>,

    /// Account to include (repeatable). Defaults to all.
    #[arg(long = "account")]
    pub accounts: Vec<String>,

    /// Allow degraded spot-advisor results instead of gating them out.
    #[arg(long)]
    pub no_fail_fast: bool,

    /// Forbid prompts; every choice must come from flags.
    #[arg(long)]
    pub non_interactive: bool,

    /// Answer yes to the destructive-action confirmation.
    #[arg(long)]
    pub yes: bool,

    /// Proceed even when an account name carries a production marker.
    #[arg(long)]
    pub allow_production: bool,

    /// Roll back automatically when the session ends with failures.
    #[arg(long)]
    pub auto_rollback: bool,

    /// Base directory for ledgers, reports and logs.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Args, Clone)]
pub struct EksClusterArgs {
    /// Target cluster name (repeatable).
    #[arg(long = "cluster", required = true)]
    pub clusters: Vec<String>,

    /// Region the clusters live in.
    #[arg(long)]
    pub region: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create EC2 instances and/or Auto Scaling Groups across accounts.
    Provision {
        #[command(flatten)]
        session: SessionArgs,

        /// Launch one EC2 instance per identity.
        #[arg(long)]
        ec2: bool,

        /// Create one Auto Scaling Group per identity.
        #[arg(long)]
        asg: bool,

        /// Instance type; picked by the spot advisor when omitted.
        #[arg(long)]
        instance_type: Option<String>,

        /// Region → AMI mapping file.
        #[arg(long, default_value = "ec2-region-ami-mapping.json")]
        ami_mapping: PathBuf,
    },

    /// Delete EC2 instances and security groups.
    CleanupEc2(SessionArgs),
    /// Empty and delete S3 buckets.
    CleanupS3(SessionArgs),
    /// Remove cluster autoscalers from EKS clusters.
    CleanupEks(SessionArgs),
    /// Delete EventBridge rules, buses, and archives.
    CleanupEventbridge(SessionArgs),
    /// Delete Redshift clusters and their groups.
    CleanupRedshift(SessionArgs),
    /// Delete Step Functions state machines.
    CleanupStepfunctions(SessionArgs),
    /// Delete SageMaker notebooks, endpoints, configs, and models.
    CleanupSagemaker(SessionArgs),
    /// Delete automation-created IAM users and groups.
    CleanupIam(SessionArgs),
    /// Delete MQ brokers.
    CleanupMq(SessionArgs),
    /// Delete FSx file systems.
    CleanupFsx(SessionArgs),
    /// Delete Storage Gateway gateways.
    CleanupStoragegateway(SessionArgs),

    /// Run cloud-nuke against each selected account and region.
    Nuke {
        #[command(flatten)]
        session: SessionArgs,

        /// cloud-nuke config file passed through to the tool.
        #[arg(long)]
        nuke_config: PathBuf,
    },

    /// Delete the cluster-autoscaler from named EKS clusters.
    EksDeleteAutoscaler {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        eks: EksClusterArgs,
    },

    /// Configure aws-auth (and access entries) on named EKS clusters.
    EksConfigureAuth {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        eks: EksClusterArgs,
    },

    /// Replay a session ledger in reverse, deleting what it created.
    Rollback {
        #[command(flatten)]
        session: SessionArgs,

        /// Session id to roll back (as printed at session start).
        #[arg(long)]
        session_id: String,
    },

    /// Rank spot instance types for a region.
    Advise {
        #[command(flatten)]
        session: SessionArgs,

        /// Region to analyze; defaults to the first configured region.
        #[arg(long)]
        advise_region: Option<String>,

        /// Workload class: general, compute, memory, storage, accelerated, mixed.
        #[arg(long, default_value = "general")]
        workload: String,

        /// Target capacity in vCPUs.
        #[arg(long, default_value_t = 16)]
        target_vcpu: i32,

        /// How many candidates to print.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },

    /// Regenerate the dashboard from existing reports.
    Dashboard {
        /// Service subtree to aggregate (e.g. ec2, s3).
        #[arg(long, default_value = "ec2")]
        service: String,

        /// Base directory containing the aws/<service>/reports tree.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cleanup_flags_parse() {
        let cli = Cli::parse_from([
            "skysweep",
            "cleanup-ec2",
            "--dry-run",
            "--workers",
            "8",
            "--region",
            "us-east-1",
            "--region",
            "ap-south-1",
            "--account",
            "account03",
            "--yes",
        ]);
        match cli.command {
            Commands::CleanupEc2(session) => {
                assert!(session.dry_run);
                assert_eq!(session.workers, 8);
                assert_eq!(session.regions, ["us-east-1", "ap-south-1"]);
                assert_eq!(session.accounts, ["account03"]);
                assert!(session.yes);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
