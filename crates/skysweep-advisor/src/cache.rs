use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;

/// On-disk JSON cache for advisor data.
///
/// Each entry is a file `<name>.json` wrapping the payload with its fetch
/// timestamp, so TTL checks do not depend on filesystem mtimes. Writes go
/// through a temp file and rename so concurrent readers never observe a
/// torn entry.
pub struct DiskCache {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    fetched_at: jiff::Timestamp,
    value: T,
}

impl DiskCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AdvisorError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Fetch an entry if present, parseable, and younger than `ttl`.
    pub fn get<T: DeserializeOwned>(&self, name: &str, ttl: Duration) -> Option<T> {
        let path = self.dir.join(format!("{name}.json"));
        let contents = std::fs::read_to_string(&path).ok()?;
        let envelope: Envelope<T> = match serde_json::from_str(&contents) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                return None;
            }
        };

        let age = jiff::Timestamp::now().since(envelope.fetched_at).ok()?;
        if age.get_seconds() < 0 || age.get_seconds() as u64 > ttl.as_secs() {
            return None;
        }
        Some(envelope.value)
    }

    pub fn put<T: Serialize>(&self, name: &str, value: &T) -> Result<(), AdvisorError> {
        let envelope = Envelope {
            fetched_at: jiff::Timestamp::now(),
            value,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;
        let path = self.dir.join(format!("{name}.json"));
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), "cache entry written");
        Ok(())
    }
}

/// Stable hex key for a set of cache inputs. `DefaultHasher::new()` uses
/// fixed keys, so the value is reproducible across runs.
pub fn stable_key(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct Payload {
        n: u32,
    }

    #[test]
    fn round_trip_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        cache.put("entry", &Payload { n: 7 }).unwrap();
        let got: Payload = cache.get("entry", Duration::from_secs(3600)).unwrap();
        assert_eq!(got, Payload { n: 7 });
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        cache.put("entry", &Payload { n: 7 }).unwrap();
        // Any nonzero age exceeds a 0s TTL.
        std::thread::sleep(Duration::from_millis(1100));
        assert!(cache.get::<Payload>("entry", Duration::ZERO).is_none());
    }

    #[test]
    fn missing_and_corrupt_entries_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        assert!(cache
            .get::<Payload>("absent", Duration::from_secs(60))
            .is_none());

        std::fs::write(dir.path().join("bad.json"), "not json").unwrap();
        assert!(cache
            .get::<Payload>("bad", Duration::from_secs(60))
            .is_none());
    }

    #[test]
    fn stable_key_is_order_sensitive_and_reproducible() {
        let a = stable_key(&["us-east-1", "m5.xlarge", "16"]);
        let b = stable_key(&["us-east-1", "m5.xlarge", "16"]);
        let c = stable_key(&["m5.xlarge", "us-east-1", "16"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
