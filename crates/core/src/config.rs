use std::env;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Concurrent query dispatch cap (the query gate).
    pub query_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This node's id within the cluster.
    pub node_id: i64,
    /// Total partition count across the cluster.
    pub partition_max: usize,
    /// Peer routes as `id=base_url` pairs, e.g. `1=http://10.0.0.1:8080`.
    /// Empty means single-node: the node routes every partition to itself.
    pub routes: Vec<(i64, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker thread count; 0 resolves to the logical CPU count.
    pub workers: usize,
    /// Idle sleep ceiling per worker in milliseconds.
    pub run_interval_ms: i64,
}

impl SchedulerConfig {
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            run_interval_ms: 100,
        }
    }
}

fn parse_routes(raw: &str) -> Vec<(i64, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (id, url) = pair.trim().split_once('=')?;
            Some((id.trim().parse().ok()?, url.trim().to_string()))
        })
        .collect()
}

impl Config {
    /// Build config from environment variables (after `load_dotenv`).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("OPENSET_HOST", "0.0.0.0"),
                port: env_u16("OPENSET_PORT", 8080),
                query_cap: env_usize("OPENSET_QUERY_CAP", 8),
            },
            cluster: ClusterConfig {
                node_id: env_i64("OPENSET_NODE_ID", 1),
                partition_max: env_usize("OPENSET_PARTITION_MAX", 16),
                routes: parse_routes(&env_or("OPENSET_ROUTES", "")),
            },
            scheduler: SchedulerConfig {
                workers: env_usize("OPENSET_WORKERS", 0),
                run_interval_ms: env_i64("OPENSET_RUN_INTERVAL_MS", 100),
            },
        }
    }

    pub fn log_summary(&self) {
        info!(
            "node {} on {}:{} - {} partitions, {} workers, query cap {}",
            self.cluster.node_id,
            self.server.host,
            self.server.port,
            self.cluster.partition_max,
            self.scheduler.resolved_workers(),
            self.server.query_cap,
        );
        for (id, url) in &self.cluster.routes {
            info!("route {} -> {}", id, url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_parse_pairs_and_skip_garbage() {
        let routes = parse_routes("1=http://a:8080, 2=http://b:8080,oops,=x");
        assert_eq!(
            routes,
            vec![
                (1, "http://a:8080".to_string()),
                (2, "http://b:8080".to_string()),
            ]
        );
    }

    #[test]
    fn empty_routes_mean_single_node() {
        assert!(parse_routes("").is_empty());
    }
}
