use std::time::Duration;

use clap::Parser;
use director_nats::ConfigError;
use director_rpc::{Request, RpcConfig};
use director_std::ReadEnv;
use serde_json::Value;
use tracing::warn;

const MIN_TIMEOUT_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_TIMEOUT_SECS: &str = "DIRECTOR_RPC_TIMEOUT_SECS";

#[derive(Parser, Debug)]
#[command(name = "director-rpc")]
#[command(about = "Send one request to an agent over NATS and print its reply", long_about = None)]
pub struct Args {
    /// Subject the agent listens on, e.g. `agent.123`.
    pub destination: String,

    #[arg(default_value = "ping")]
    pub method: String,

    /// JSON argument for the method; repeat for several.
    #[arg(long = "arg", value_parser = parse_json)]
    pub arguments: Vec<Value>,

    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug)]
pub struct Invocation {
    pub config: RpcConfig,
    pub destination: String,
    pub request: Request,
    pub timeout: Duration,
}

pub fn from_env_with_provider<E: ReadEnv>(env_provider: &E) -> Result<Invocation, ConfigError> {
    let args = Args::parse();
    from_args(args, env_provider)
}

pub fn from_args<E: ReadEnv>(args: Args, env_provider: &E) -> Result<Invocation, ConfigError> {
    let config = RpcConfig::from_env(env_provider)?;
    let timeout = match args.timeout_secs {
        Some(secs) if secs >= MIN_TIMEOUT_SECS => Duration::from_secs(secs),
        Some(secs) => {
            warn!("--timeout-secs {secs} is below minimum ({MIN_TIMEOUT_SECS}), ignoring");
            timeout_from_env(env_provider)
        }
        None => timeout_from_env(env_provider),
    };

    Ok(Invocation {
        config,
        destination: args.destination,
        request: Request::new(args.method).with_arguments(args.arguments),
        timeout,
    })
}

fn timeout_from_env<E: ReadEnv>(env_provider: &E) -> Duration {
    let default = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

    match env_provider.var(ENV_TIMEOUT_SECS) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs >= MIN_TIMEOUT_SECS => Duration::from_secs(secs),
            Ok(secs) => {
                warn!("{ENV_TIMEOUT_SECS}={secs} is below minimum ({MIN_TIMEOUT_SECS}), using default");
                default
            }
            Err(_) => {
                warn!("{ENV_TIMEOUT_SECS}={raw:?} is not a valid integer, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use director_std::InMemoryEnv;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn warnings_while<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        let warnings = output
            .lines()
            .filter(|line| line.contains("WARN"))
            .map(str::to_string)
            .collect();
        (value, warnings)
    }

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("director-rpc").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn method_defaults_to_ping() {
        let invocation = from_args(args(&["agent.123"]), &InMemoryEnv::new()).unwrap();
        assert_eq!(invocation.destination, "agent.123");
        assert_eq!(invocation.request.method, "ping");
        assert!(invocation.request.arguments.is_empty());
        assert_eq!(invocation.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn method_and_json_arguments() {
        let invocation = from_args(
            args(&["agent.1", "get_task", "--arg", r#""t-7""#, "--arg", r#"{"full":true}"#]),
            &InMemoryEnv::new(),
        )
        .unwrap();
        assert_eq!(invocation.request.method, "get_task");
        assert_eq!(invocation.request.arguments, vec![json!("t-7"), json!({"full": true})]);
    }

    #[test]
    fn invalid_json_argument_is_rejected() {
        let result = Args::try_parse_from(["director-rpc", "agent.1", "m", "--arg", "{nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn timeout_read_from_env() {
        let env = InMemoryEnv::new();
        env.set("DIRECTOR_RPC_TIMEOUT_SECS", "5");
        let invocation = from_args(args(&["agent.1"]), &env).unwrap();
        assert_eq!(invocation.timeout, Duration::from_secs(5));
    }

    #[test]
    fn timeout_flag_overrides_env() {
        let env = InMemoryEnv::new();
        env.set("DIRECTOR_RPC_TIMEOUT_SECS", "5");
        let invocation = from_args(args(&["agent.1", "--timeout-secs", "9"]), &env).unwrap();
        assert_eq!(invocation.timeout, Duration::from_secs(9));
    }

    #[test]
    fn invalid_env_timeout_uses_default() {
        for raw in ["0", "soon"] {
            let env = InMemoryEnv::new();
            env.set("DIRECTOR_RPC_TIMEOUT_SECS", raw);
            let invocation = from_args(args(&["agent.1"]), &env).unwrap();
            assert_eq!(invocation.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        }
    }

    #[test]
    fn invalid_env_timeout_is_reported() {
        let env = InMemoryEnv::new();
        env.set("DIRECTOR_RPC_TIMEOUT_SECS", "soon");
        let (invocation, warnings) = warnings_while(|| from_args(args(&["agent.1"]), &env));

        assert_eq!(invocation.unwrap().timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("DIRECTOR_RPC_TIMEOUT_SECS"));
        assert!(warnings[0].contains("not a valid integer"));
    }

    #[test]
    fn zero_timeout_flag_is_reported_and_ignored() {
        let env = InMemoryEnv::new();
        env.set("DIRECTOR_RPC_TIMEOUT_SECS", "5");
        let (invocation, warnings) =
            warnings_while(|| from_args(args(&["agent.1", "--timeout-secs", "0"]), &env));

        assert_eq!(invocation.unwrap().timeout, Duration::from_secs(5));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("--timeout-secs 0 is below minimum"));
    }

    #[test]
    fn valid_timeout_flag_logs_nothing() {
        let (invocation, warnings) = warnings_while(|| {
            from_args(args(&["agent.1", "--timeout-secs", "3"]), &InMemoryEnv::new())
        });

        assert_eq!(invocation.unwrap().timeout, Duration::from_secs(3));
        assert!(warnings.is_empty());
    }

    #[test]
    fn config_errors_propagate() {
        let env = InMemoryEnv::new();
        env.set("NATS_CLIENT_CERT", "/etc/director/client.pem");
        assert!(from_args(args(&["agent.1"]), &env).is_err());
    }

    #[test]
    fn inbox_settings_come_from_env() {
        let env = InMemoryEnv::new();
        env.set("DIRECTOR_INBOX_PREFIX", "fleet");
        env.set("DIRECTOR_PROCESS_ID", "p-7");
        let invocation = from_args(args(&["agent.1"]), &env).unwrap();
        assert_eq!(invocation.config.inbox().name(), "fleet.p-7");
    }
}
