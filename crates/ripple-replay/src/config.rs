use std::path::PathBuf;

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `RIPPLE_DB_PATH`, defaults to `ripple.db`
    pub db_path: PathBuf,
    /// `RIPPLE_EVENTS_PATH`; stdin when unset
    pub events_path: Option<PathBuf>,
    /// `RIPPLE_CHANNEL_QUERY`: filter hash whose channel list is printed after replay
    pub channel_query: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            db_path: non_empty("RIPPLE_DB_PATH")
                .unwrap_or_else(|| "ripple.db".into())
                .into(),
            events_path: non_empty("RIPPLE_EVENTS_PATH").map(PathBuf::from),
            channel_query: non_empty("RIPPLE_CHANNEL_QUERY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let env = HashMap::from([("RIPPLE_EVENTS_PATH", " ")]);
        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.db_path, PathBuf::from("ripple.db"));
        assert_eq!(config.events_path, None);
        assert_eq!(config.channel_query, None);
    }

    #[test]
    fn reads_every_variable() {
        let env = HashMap::from([
            ("RIPPLE_DB_PATH", "/tmp/store.db"),
            ("RIPPLE_EVENTS_PATH", "events.jsonl"),
            ("RIPPLE_CHANNEL_QUERY", "abc123"),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.db_path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.events_path, Some(PathBuf::from("events.jsonl")));
        assert_eq!(config.channel_query.as_deref(), Some("abc123"));
    }
}
