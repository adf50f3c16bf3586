//! Configuration options.
//!
//! No CLI/file-loading lives here — the embedding application owns that.
//! `Config` derives `Serialize`/`Deserialize` so an embedder's own config
//! layer can (de)serialize it freely.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Probe failures before Suspected.
    pub failure_threshold: u32,
    /// Probe failures before Unreachable.
    pub unreachable_threshold: u32,
    /// Static direct-ping timeout override; disables adaptation when set.
    #[serde(with = "duration_opt_millis")]
    pub ping_timeout: Option<Duration>,
    /// Static inter-probe delay override; disables adaptation when set.
    #[serde(with = "duration_opt_millis")]
    pub probe_interval: Option<Duration>,
    /// How long an intermediary waits for its forwarded ping.
    #[serde(with = "duration_millis")]
    pub intermediary_timeout: Duration,
    /// Rolling-window width for per-peer traffic metrics.
    #[serde(with = "duration_millis")]
    pub metrics_window: Duration,
    /// Static gossip pacing override.
    #[serde(with = "duration_millis")]
    pub gossip_interval: Duration,
    /// If true and no static override, compute gossip pacing from RTT.
    pub adaptive_timing_enabled: bool,
    /// When a pending delta is considered abandoned.
    #[serde(with = "duration_millis")]
    pub pending_delta_ttl: Duration,
    /// Per-peer pending sends that blocks gossip to that peer.
    pub peer_congestion_threshold: u32,

    /// Lower bound fed to every adaptive-timeout `clamp(min, max)`.
    pub min_ping_timeout: Duration,
    /// Upper bound for the adaptive ping timeout.
    pub max_ping_timeout: Duration,
    /// Lower bound for the adaptive probe interval.
    pub min_probe_interval: Duration,
    /// Upper bound for the adaptive probe interval.
    pub max_probe_interval: Duration,
    /// Lower bound for the adaptive gossip interval.
    pub min_gossip_interval: Duration,
    /// Upper bound for the adaptive gossip interval.
    pub max_gossip_interval: Duration,

    /// Number of intermediaries consulted during an indirect probe.
    pub indirect_fanout: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            unreachable_threshold: 9,
            ping_timeout: None,
            probe_interval: None,
            intermediary_timeout: Duration::from_millis(200),
            metrics_window: Duration::from_millis(10_000),
            gossip_interval: Duration::from_millis(500),
            adaptive_timing_enabled: false,
            pending_delta_ttl: Duration::from_secs(5),
            peer_congestion_threshold: 3,

            min_ping_timeout: Duration::from_millis(200),
            max_ping_timeout: Duration::from_secs(10),
            min_probe_interval: Duration::from_millis(500),
            max_probe_interval: Duration::from_secs(30),
            min_gossip_interval: Duration::from_millis(100),
            max_gossip_interval: Duration::from_secs(5),

            indirect_fanout: 3,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.unreachable_threshold, 9);
        assert_eq!(cfg.intermediary_timeout, Duration::from_millis(200));
        assert_eq!(cfg.gossip_interval, Duration::from_millis(500));
        assert!(!cfg.adaptive_timing_enabled);
        assert_eq!(cfg.pending_delta_ttl, Duration::from_secs(5));
        assert_eq!(cfg.peer_congestion_threshold, 3);
    }
}
