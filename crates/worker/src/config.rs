use std::time::Duration;

const DEFAULT_AUTOMATION_SECS: u64 = 60;
const DEFAULT_SCHEDULED_SECS: u64 = 60;
const DEFAULT_BOUNCE_SECS: u64 = 3600;
const DEFAULT_HYGIENE_SECS: u64 = 86_400;
const DEFAULT_SHUTDOWN_SECS: u64 = 30;

/// How often each job runs, and how long shutdown waits for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub automation_interval: Duration,
    pub scheduled_interval: Duration,
    pub bounce_interval: Duration,
    pub hygiene_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            automation_interval: Duration::from_secs(DEFAULT_AUTOMATION_SECS),
            scheduled_interval: Duration::from_secs(DEFAULT_SCHEDULED_SECS),
            bounce_interval: Duration::from_secs(DEFAULT_BOUNCE_SECS),
            hygiene_interval: Duration::from_secs(DEFAULT_HYGIENE_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_SECS),
        }
    }
}

impl WorkerConfig {
    /// Load from environment variables.
    ///
    /// | Env var                        | Default  |
    /// |--------------------------------|----------|
    /// | `AUTOMATION_INTERVAL_SECS`     | `60`     |
    /// | `SCHEDULED_INTERVAL_SECS`      | `60`     |
    /// | `BOUNCE_INTERVAL_SECS`         | `3600`   |
    /// | `HYGIENE_INTERVAL_SECS`        | `86400`  |
    /// | `WORKER_SHUTDOWN_TIMEOUT_SECS` | `30`     |
    ///
    /// # Panics
    ///
    /// Panics if a variable is set but is not a positive number of seconds.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| -> Duration {
            let value = match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or_else(|| panic!("{key} must be a positive number of seconds")),
                None => default,
            };
            Duration::from_secs(value)
        };

        Self {
            automation_interval: secs("AUTOMATION_INTERVAL_SECS", DEFAULT_AUTOMATION_SECS),
            scheduled_interval: secs("SCHEDULED_INTERVAL_SECS", DEFAULT_SCHEDULED_SECS),
            bounce_interval: secs("BOUNCE_INTERVAL_SECS", DEFAULT_BOUNCE_SECS),
            hygiene_interval: secs("HYGIENE_INTERVAL_SECS", DEFAULT_HYGIENE_SECS),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT_SECS", DEFAULT_SHUTDOWN_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(WorkerConfig::from_lookup(lookup(&[])), WorkerConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("AUTOMATION_INTERVAL_SECS", "15"),
            ("HYGIENE_INTERVAL_SECS", " 600 "),
        ]));
        assert_eq!(config.automation_interval, Duration::from_secs(15));
        assert_eq!(config.hygiene_interval, Duration::from_secs(600));
        assert_eq!(config.scheduled_interval, Duration::from_secs(60));
    }

    #[test]
    #[should_panic(expected = "BOUNCE_INTERVAL_SECS")]
    fn zero_interval_is_rejected() {
        WorkerConfig::from_lookup(lookup(&[("BOUNCE_INTERVAL_SECS", "0")]));
    }

    #[test]
    #[should_panic(expected = "SCHEDULED_INTERVAL_SECS")]
    fn garbage_interval_is_rejected() {
        WorkerConfig::from_lookup(lookup(&[("SCHEDULED_INTERVAL_SECS", "soon")]));
    }
}
