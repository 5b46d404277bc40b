use serde::{Deserialize, Serialize};

/// Broad workload class selecting which instance families are candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
    General,
    Compute,
    Memory,
    Storage,
    Accelerated,
    /// General + compute + memory combined.
    Mixed,
}

const GENERAL: &[&str] = &[
    "t3", "t3a", "t4g", "m5", "m5a", "m6i", "m6a", "m6g", "m7i", "m7g", "m7a",
];
const COMPUTE: &[&str] = &[
    "c5", "c5a", "c5n", "c6i", "c6a", "c6g", "c7i", "c7g", "c7a", "c7gn",
];
const MEMORY: &[&str] = &[
    "r5", "r5a", "r5n", "r6i", "r6a", "r6g", "r7i", "r7g", "r7a", "r7iz", "x2idn", "x2iedn",
    "x2iezn",
];
const STORAGE: &[&str] = &["i3", "i3en", "i4i", "i4g", "d2", "d3", "d3en", "h1"];
const ACCELERATED: &[&str] = &[
    "p3", "p4", "p5", "g4dn", "g5", "g5g", "inf1", "inf2", "trn1", "trn1n",
];

impl WorkloadClass {
    /// Family prefixes for this class.
    pub fn families(&self) -> Vec<&'static str> {
        match self {
            WorkloadClass::General => GENERAL.to_vec(),
            WorkloadClass::Compute => COMPUTE.to_vec(),
            WorkloadClass::Memory => MEMORY.to_vec(),
            WorkloadClass::Storage => STORAGE.to_vec(),
            WorkloadClass::Accelerated => ACCELERATED.to_vec(),
            WorkloadClass::Mixed => {
                let mut all = GENERAL.to_vec();
                all.extend_from_slice(COMPUTE);
                all.extend_from_slice(MEMORY);
                all
            }
        }
    }

    /// Whether a concrete type like `m5.xlarge` belongs to this class.
    pub fn matches(&self, instance_type: &str) -> bool {
        let family = instance_type.split('.').next().unwrap_or(instance_type);
        self.families().contains(&family)
    }
}

impl std::str::FromStr for WorkloadClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(WorkloadClass::General),
            "compute" => Ok(WorkloadClass::Compute),
            "memory" => Ok(WorkloadClass::Memory),
            "storage" => Ok(WorkloadClass::Storage),
            "accelerated" => Ok(WorkloadClass::Accelerated),
            "mixed" => Ok(WorkloadClass::Mixed),
            other => Err(format!("unknown workload class: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_spans_three_classes() {
        assert!(WorkloadClass::Mixed.matches("m5.xlarge"));
        assert!(WorkloadClass::Mixed.matches("c5.xlarge"));
        assert!(WorkloadClass::Mixed.matches("r6i.2xlarge"));
        assert!(!WorkloadClass::Mixed.matches("p4.24xlarge"));
    }

    #[test]
    fn compute_excludes_general() {
        assert!(WorkloadClass::Compute.matches("c6i.large"));
        assert!(!WorkloadClass::Compute.matches("m5.large"));
    }

    #[test]
    fn parse_from_flag_value() {
        assert_eq!("mixed".parse::<WorkloadClass>().unwrap(), WorkloadClass::Mixed);
        assert!("gpu".parse::<WorkloadClass>().is_err());
    }
}
