//! Expand user intent into a dependency-ordered task list.
//!
//! Provisioning expands per handle × region. Cleanup expands to one
//! discovery task per (handle, region, service); the executor turns each
//! discovery result into concrete delete tasks with their dependency edges.

use skysweep_core::task::Service;
use skysweep_core::{CredentialHandle, Task, TaskKind};

use crate::error::EngineError;
use crate::graph::DependencyGraph;

/// Account-name fragments that indicate a production account.
const PRODUCTION_MARKERS: [&str; 5] = ["prod", "production", "live", "main", "master"];

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Abort when the expected resource count exceeds this.
    pub max_resources: usize,
    /// Proceed even when an account name carries a production marker.
    pub allow_production: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_resources: 50,
            allow_production: false,
        }
    }
}

/// What the session should do.
#[derive(Debug, Clone)]
pub enum Intent {
    Provision {
        create_ec2: bool,
        create_asg: bool,
        /// Selected once against the first handle's region and replicated.
        instance_type: String,
        ami_by_region: std::collections::BTreeMap<String, String>,
    },
    Cleanup {
        services: Vec<Service>,
    },
    CloudNuke {
        config_path: String,
    },
    EksAutoscalerDelete {
        clusters: Vec<(String, String)>, // (cluster, region)
    },
    EksAuthConfigure {
        clusters: Vec<(String, String)>,
    },
}

/// Find the production marker in an account name, if any.
pub fn production_marker(account_name: &str) -> Option<&'static str> {
    let lowered = account_name.to_ascii_lowercase();
    PRODUCTION_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
        .copied()
}

/// Expand the intent into tasks inside `graph`.
///
/// Pre-flight checks run first: production-marker guard (unless overridden)
/// and the expected-resource ceiling. Either failing leaves the graph empty.
pub fn plan(
    graph: &mut DependencyGraph,
    handles: &[CredentialHandle],
    intent: &Intent,
    config: &PlannerConfig,
) -> Result<(), EngineError> {
    for handle in handles {
        if let Some(marker) = production_marker(&handle.account_name) {
            if !config.allow_production {
                return Err(EngineError::ProductionGuard {
                    account: handle.account_name.clone(),
                    marker: marker.to_string(),
                });
            }
            tracing::warn!(
                account = %handle.account_name,
                marker,
                "production-looking account included by explicit override"
            );
        }
    }

    let expected = expected_task_count(handles, intent);
    if expected > config.max_resources {
        return Err(EngineError::TooManyResources {
            expected,
            max: config.max_resources,
        });
    }

    match intent {
        Intent::Provision {
            create_ec2,
            create_asg,
            instance_type,
            ami_by_region,
        } => {
            for handle in handles {
                for region in &handle.regions {
                    let ami = ami_by_region.get(region).cloned().ok_or_else(|| {
                        EngineError::Config(skysweep_config::ConfigError::NoAmiForRegion(
                            region.clone(),
                        ))
                    })?;
                    if *create_ec2 {
                        let id = graph.allocate_id();
                        graph.insert(Task::new(
                            id,
                            TaskKind::CreateEc2 {
                                instance_type: instance_type.clone(),
                                ami_id: ami.clone(),
                            },
                            handle.clone(),
                            region.clone(),
                        ));
                    }
                    if *create_asg {
                        let id = graph.allocate_id();
                        graph.insert(Task::new(
                            id,
                            TaskKind::CreateAsg {
                                instance_type: instance_type.clone(),
                                ami_id: ami.clone(),
                                min_size: 1,
                                max_size: 2,
                                desired_capacity: 1,
                            },
                            handle.clone(),
                            region.clone(),
                        ));
                    }
                }
            }
        }
        Intent::Cleanup { services } => {
            for handle in handles {
                for region in &handle.regions {
                    for service in services {
                        let id = graph.allocate_id();
                        graph.insert(Task::new(
                            id,
                            TaskKind::Discover { service: *service },
                            handle.clone(),
                            region.clone(),
                        ));
                    }
                }
            }
        }
        Intent::CloudNuke { config_path } => {
            for handle in handles {
                for region in &handle.regions {
                    let id = graph.allocate_id();
                    graph.insert(Task::new(
                        id,
                        TaskKind::RunCloudNuke {
                            config_path: config_path.clone(),
                        },
                        handle.clone(),
                        region.clone(),
                    ));
                }
            }
        }
        Intent::EksAutoscalerDelete { clusters } => {
            plan_per_cluster(graph, handles, clusters, |cluster| {
                TaskKind::DeleteEksAutoscaler { cluster }
            });
        }
        Intent::EksAuthConfigure { clusters } => {
            plan_per_cluster(graph, handles, clusters, |cluster| {
                TaskKind::ConfigureEksAuth { cluster }
            });
        }
    }

    tracing::info!(tasks = graph.len(), "session plan ready");
    Ok(())
}

fn plan_per_cluster(
    graph: &mut DependencyGraph,
    handles: &[CredentialHandle],
    clusters: &[(String, String)],
    make_kind: impl Fn(String) -> TaskKind,
) {
    for (cluster, region) in clusters {
        // A cluster named for an account routes to that account's handle;
        // otherwise the first handle is used.
        let handle = handles
            .iter()
            .find(|h| cluster.contains(&h.account_name))
            .or_else(|| handles.first());
        if let Some(handle) = handle {
            let id = graph.allocate_id();
            graph.insert(Task::new(
                id,
                make_kind(cluster.clone()),
                handle.clone(),
                region.clone(),
            ));
        }
    }
}

fn expected_task_count(handles: &[CredentialHandle], intent: &Intent) -> usize {
    let region_pairs: usize = handles.iter().map(|h| h.regions.len()).sum();
    match intent {
        Intent::Provision {
            create_ec2,
            create_asg,
            ..
        } => region_pairs * (usize::from(*create_ec2) + usize::from(*create_asg)),
        Intent::Cleanup { services } => region_pairs * services.len(),
        Intent::CloudNuke { .. } => region_pairs,
        Intent::EksAutoscalerDelete { clusters } | Intent::EksAuthConfigure { clusters } => {
            clusters.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysweep_core::CredentialKind;

    fn handle(name: &str, regions: &[&str]) -> CredentialHandle {
        CredentialHandle {
            account_name: name.into(),
            account_id: "111111111111".into(),
            email: "a@x.com".into(),
            access_key: "AK".into(),
            secret_key: "SK".into(),
            kind: CredentialKind::Root,
            username: None,
            regions: regions.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn provision_intent() -> Intent {
        Intent::Provision {
            create_ec2: true,
            create_asg: true,
            instance_type: "m5.xlarge".into(),
            ami_by_region: [
                ("us-east-1".to_string(), "ami-east".to_string()),
                ("us-west-2".to_string(), "ami-west".to_string()),
            ]
            .into(),
        }
    }

    #[test]
    fn provision_expands_per_handle_region() {
        let mut graph = DependencyGraph::new();
        let handles = vec![
            handle("account01", &["us-east-1", "us-west-2"]),
            handle("account02", &["us-east-1"]),
        ];
        plan(
            &mut graph,
            &handles,
            &provision_intent(),
            &PlannerConfig::default(),
        )
        .unwrap();
        // 3 (handle, region) pairs × 2 creations
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn production_marker_blocks_without_override() {
        let mut graph = DependencyGraph::new();
        let handles = vec![handle("acme-production", &["us-east-1"])];
        let err = plan(
            &mut graph,
            &handles,
            &provision_intent(),
            &PlannerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ProductionGuard { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn production_override_allows_planning() {
        let mut graph = DependencyGraph::new();
        let handles = vec![handle("main-account", &["us-east-1"])];
        let config = PlannerConfig {
            allow_production: true,
            ..Default::default()
        };
        plan(&mut graph, &handles, &provision_intent(), &config).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn resource_ceiling_aborts() {
        let mut graph = DependencyGraph::new();
        let handles = vec![handle("account01", &["us-east-1", "us-west-2"])];
        let config = PlannerConfig {
            max_resources: 3,
            ..Default::default()
        };
        let err = plan(&mut graph, &handles, &provision_intent(), &config).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TooManyResources {
                expected: 4,
                max: 3
            }
        ));
    }

    #[test]
    fn cleanup_emits_discovery_per_service() {
        let mut graph = DependencyGraph::new();
        let handles = vec![handle("account01", &["us-east-1"])];
        plan(
            &mut graph,
            &handles,
            &Intent::Cleanup {
                services: vec![Service::Ec2, Service::S3],
            },
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph
            .tasks()
            .all(|t| matches!(t.kind, TaskKind::Discover { .. })));
    }

    #[test]
    fn missing_ami_is_config_error() {
        let mut graph = DependencyGraph::new();
        let handles = vec![handle("account01", &["eu-central-1"])];
        let err = plan(
            &mut graph,
            &handles,
            &provision_intent(),
            &PlannerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn marker_detection_is_case_insensitive_substring() {
        assert_eq!(production_marker("MyLiveAccount"), Some("live"));
        assert_eq!(production_marker("staging-07"), None);
    }
}
