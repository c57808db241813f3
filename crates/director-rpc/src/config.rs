use director_nats::{ConfigError, NatsConfig};
use director_std::ReadEnv;

use crate::inbox::{DEFAULT_INBOX_PREFIX, Inbox};
use crate::request_id::RequestId;

const ENV_INBOX_PREFIX: &str = "DIRECTOR_INBOX_PREFIX";
const ENV_PROCESS_ID: &str = "DIRECTOR_PROCESS_ID";
const MAX_PREFIX_LENGTH: usize = 128;
const MAX_PROCESS_ID_LENGTH: usize = 64;

/// Runtime configuration for [`NatsRpc`](crate::NatsRpc).
#[derive(Debug, Clone)]
pub struct RpcConfig {
    nats: NatsConfig,
    inbox_prefix: String,
    process_id: String,
}

impl RpcConfig {
    /// Default prefix and a random process id.
    pub fn new(nats: NatsConfig) -> Self {
        Self {
            nats,
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
            process_id: RequestId::generate().to_string(),
        }
    }

    pub fn with_inbox_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        self.inbox_prefix = prefix;
        Ok(self)
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Result<Self, ConfigError> {
        let process_id = process_id.into();
        validate_process_id(&process_id)?;
        self.process_id = process_id;
        Ok(self)
    }

    pub fn from_env<E: ReadEnv>(env: &E) -> Result<Self, ConfigError> {
        let mut config = Self::new(NatsConfig::from_env(env)?);
        if let Some(prefix) = env.non_empty_var(ENV_INBOX_PREFIX) {
            config = config.with_inbox_prefix(prefix)?;
        }
        if let Some(process_id) = env.non_empty_var(ENV_PROCESS_ID) {
            config = config.with_process_id(process_id)?;
        }
        Ok(config)
    }

    pub fn nats(&self) -> &NatsConfig {
        &self.nats
    }

    pub fn inbox_prefix(&self) -> &str {
        &self.inbox_prefix
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn inbox(&self) -> Inbox {
        Inbox::new(&self.inbox_prefix, &self.process_id)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn forbidden_char(value: &str) -> Option<char> {
    value
        .chars()
        .find(|ch| matches!(ch, '*' | '>') || ch.is_whitespace())
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    const FIELD: &str = "inbox prefix";
    if prefix.is_empty() {
        return Err(invalid(FIELD, "must not be empty"));
    }
    if let Some(ch) = forbidden_char(prefix) {
        return Err(invalid(FIELD, format!("contains invalid character {:?}", ch)));
    }
    if prefix.split('.').any(str::is_empty) {
        return Err(invalid(FIELD, "contains an empty subject token"));
    }
    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(invalid(
            FIELD,
            format!("is {} bytes (max {})", prefix.len(), MAX_PREFIX_LENGTH),
        ));
    }
    Ok(())
}

// One subject token: replies are routed by position after the prefix.
fn validate_process_id(process_id: &str) -> Result<(), ConfigError> {
    const FIELD: &str = "process id";
    if process_id.is_empty() {
        return Err(invalid(FIELD, "must not be empty"));
    }
    if let Some(ch) = forbidden_char(process_id).or_else(|| process_id.chars().find(|&c| c == '.')) {
        return Err(invalid(FIELD, format!("contains invalid character {:?}", ch)));
    }
    if process_id.len() > MAX_PROCESS_ID_LENGTH {
        return Err(invalid(
            FIELD,
            format!("is {} bytes (max {})", process_id.len(), MAX_PROCESS_ID_LENGTH),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use director_std::InMemoryEnv;

    #[test]
    fn defaults_use_director_prefix_and_random_process_id() {
        let a = RpcConfig::new(NatsConfig::from_url("localhost:4222"));
        let b = RpcConfig::new(NatsConfig::from_url("localhost:4222"));
        assert_eq!(a.inbox_prefix(), "director");
        assert_ne!(a.process_id(), b.process_id());
        assert!(a.inbox().name().starts_with("director."));
    }

    #[test]
    fn from_env_reads_prefix_and_process_id() {
        let env = InMemoryEnv::from_pairs([
            ("NATS_URL", "nats://bus:4222"),
            ("DIRECTOR_INBOX_PREFIX", "fleet.director"),
            ("DIRECTOR_PROCESS_ID", "worker-7"),
        ]);
        let config = RpcConfig::from_env(&env).unwrap();
        assert_eq!(config.nats().servers, vec!["nats://bus:4222".to_string()]);
        assert_eq!(config.inbox().name(), "fleet.director.worker-7");
    }

    #[test]
    fn from_env_without_overrides_uses_defaults() {
        let config = RpcConfig::from_env(&InMemoryEnv::new()).unwrap();
        assert_eq!(config.inbox_prefix(), DEFAULT_INBOX_PREFIX);
        assert!(!config.process_id().is_empty());
    }

    #[test]
    fn from_env_propagates_invalid_prefix() {
        let env = InMemoryEnv::from_pairs([("DIRECTOR_INBOX_PREFIX", "director.>")]);
        let err = RpcConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "inbox prefix", .. }));
    }

    #[test]
    fn prefix_validation() {
        assert!(validate_prefix("director").is_ok());
        assert!(validate_prefix("a.b.c").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("a..b").is_err());
        assert!(validate_prefix(".a").is_err());
        assert!(validate_prefix("a.").is_err());
        assert!(validate_prefix("a b").is_err());
        assert!(validate_prefix("a.*").is_err());
        assert!(validate_prefix(&"a".repeat(MAX_PREFIX_LENGTH + 1)).is_err());
    }

    #[test]
    fn process_id_must_be_a_single_token() {
        assert!(validate_process_id("3f2a-9c").is_ok());
        assert!(validate_process_id("a.b").is_err());
        assert!(validate_process_id("").is_err());
        assert!(validate_process_id("*").is_err());
    }

    #[test]
    fn invalid_value_message_names_the_field() {
        let err = validate_prefix("").unwrap_err();
        assert_eq!(err.to_string(), "invalid inbox prefix: must not be empty");
    }
}
