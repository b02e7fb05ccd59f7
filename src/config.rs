use std::path::PathBuf;
use std::str::FromStr;

/// Process settings, read once from `FRONTDESK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Password every wire-protocol connection must present.
    pub password: String,
    /// Password given to the seeded `admin` account.
    pub admin_password: String,
    pub seed: bool,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "frontdesk".into(),
            admin_password: "admin123".into(),
            seed: true,
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            port: parsed(&lookup, "FRONTDESK_PORT").unwrap_or(d.port),
            bind: lookup("FRONTDESK_BIND").unwrap_or(d.bind),
            data_dir: lookup("FRONTDESK_DATA_DIR").map_or(d.data_dir, PathBuf::from),
            password: lookup("FRONTDESK_PASSWORD").unwrap_or(d.password),
            admin_password: lookup("FRONTDESK_ADMIN_PASSWORD").unwrap_or(d.admin_password),
            seed: lookup("FRONTDESK_SEED")
                .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(d.seed),
            max_connections: parsed(&lookup, "FRONTDESK_MAX_CONNECTIONS").unwrap_or(d.max_connections),
            compact_threshold: parsed(&lookup, "FRONTDESK_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            metrics_port: parsed(&lookup, "FRONTDESK_METRICS_PORT"),
            tls_cert: lookup("FRONTDESK_TLS_CERT"),
            tls_key: lookup("FRONTDESK_TLS_KEY"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("frontdesk.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = from(&[]);
        assert_eq!(c.port, 5433);
        assert_eq!(c.listen_addr(), "0.0.0.0:5433");
        assert_eq!(c.wal_path(), PathBuf::from("./data/frontdesk.wal"));
        assert!(c.seed);
        assert_eq!(c.metrics_port, None);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let c = from(&[
            ("FRONTDESK_PORT", "6543"),
            ("FRONTDESK_MAX_CONNECTIONS", "lots"),
            ("FRONTDESK_SEED", "false"),
            ("FRONTDESK_METRICS_PORT", "9100"),
            ("FRONTDESK_DATA_DIR", "/var/lib/frontdesk"),
        ]);
        assert_eq!(c.port, 6543);
        assert_eq!(c.max_connections, 256);
        assert!(!c.seed);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/frontdesk/frontdesk.wal"));
    }

    #[test]
    fn numeric_fields_parse_at_their_own_width() {
        let c = from(&[
            ("FRONTDESK_MAX_CONNECTIONS", " 100000 "),
            ("FRONTDESK_COMPACT_THRESHOLD", "5000000000"),
            ("FRONTDESK_PORT", "70000"),
        ]);
        assert_eq!(c.max_connections, 100_000);
        assert_eq!(c.compact_threshold, 5_000_000_000);
        // Out of u16 range falls back to the default.
        assert_eq!(c.port, 5433);
    }
}
