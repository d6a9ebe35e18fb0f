use serde::{Deserialize, Deserializer};
use std::convert::TryFrom;
use tokio::time::Duration;

/// Replication tuning. Unset values take defaults. In the config file every duration is given in
/// milliseconds (`heartbeat_interval_ms` etc).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationOptions {
    #[serde(default, rename = "heartbeat_interval_ms", deserialize_with = "millis")]
    pub heartbeat_interval: Option<Duration>,
    #[serde(default, rename = "election_timeout_min_ms", deserialize_with = "millis")]
    pub election_timeout_min: Option<Duration>,
    #[serde(default, rename = "election_timeout_max_ms", deserialize_with = "millis")]
    pub election_timeout_max: Option<Duration>,
    #[serde(default, rename = "rpc_timeout_ms", deserialize_with = "millis")]
    pub rpc_timeout: Option<Duration>,
    #[serde(default, rename = "commit_timeout_ms", deserialize_with = "millis")]
    pub commit_timeout: Option<Duration>,
    #[serde(default, rename = "sync_timeout_ms", deserialize_with = "millis")]
    pub sync_timeout: Option<Duration>,
    #[serde(default)]
    pub max_entries_per_append: Option<usize>,
}

#[derive(Debug, Clone)]
pub(super) struct ReplicationOptionsValidated {
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub rpc_timeout: Duration,
    pub commit_timeout: Duration,
    pub sync_timeout: Duration,
    pub max_entries_per_append: usize,
}

impl ReplicationOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err("Election minimum timeout must be greater than the primary's heartbeat interval");
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err("Election minimum timeout must be less than maximum timeout");
        }
        if self.rpc_timeout >= self.election_timeout_min {
            return Err("Peer RPC timeout must be less than the election minimum timeout");
        }
        if self.max_entries_per_append == 0 {
            return Err("Max entries per append must be positive");
        }

        Ok(())
    }
}

impl TryFrom<ReplicationOptions> for ReplicationOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ReplicationOptions) -> Result<Self, Self::Error> {
        let values = ReplicationOptionsValidated {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_millis(50)),
            election_timeout_min: options.election_timeout_min.unwrap_or(Duration::from_millis(300)),
            election_timeout_max: options.election_timeout_max.unwrap_or(Duration::from_millis(600)),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_millis(200)),
            commit_timeout: options.commit_timeout.unwrap_or(Duration::from_secs(2)),
            sync_timeout: options.sync_timeout.unwrap_or(Duration::from_secs(1)),
            max_entries_per_append: options.max_entries_per_append.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let validated = ReplicationOptionsValidated::try_from(ReplicationOptions::default()).unwrap();
        assert_eq!(validated.heartbeat_interval, Duration::from_millis(50));
        assert_eq!(validated.commit_timeout, Duration::from_secs(2));
        assert_eq!(validated.max_entries_per_append, 64);
    }

    #[test]
    fn heartbeat_must_be_shorter_than_election_timeout() {
        let options = ReplicationOptions {
            heartbeat_interval: Some(Duration::from_millis(400)),
            ..Default::default()
        };
        assert!(ReplicationOptionsValidated::try_from(options).is_err());

        let options = ReplicationOptions {
            rpc_timeout: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        assert!(ReplicationOptionsValidated::try_from(options).is_err());
    }

    #[test]
    fn durations_are_read_as_millis() {
        let options: ReplicationOptions =
            serde_json::from_str(r#"{"heartbeat_interval_ms": 20, "max_entries_per_append": 8}"#).unwrap();
        assert_eq!(options.heartbeat_interval, Some(Duration::from_millis(20)));
        assert_eq!(options.election_timeout_min, None);
        assert_eq!(options.max_entries_per_append, Some(8));
    }
}
