mod cli;
mod signal;
mod telemetry;

use director_rpc::NatsRpc;
use director_std::SystemEnv;
use serde_json::Value;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_logger();
    let invocation = match cli::from_env_with_provider(&SystemEnv) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            telemetry::shutdown();
            return Err(e.into());
        }
    };

    let nats = invocation.config.nats();
    info!(
        servers = ?nats.redacted_servers(),
        auth = nats.auth.description(),
        tls = nats.tls_description(),
        inbox = %invocation.config.inbox().name(),
        "director-rpc starting"
    );

    let rpc = NatsRpc::from_config(&invocation.config);
    let result = tokio::select! {
        result = rpc.call(&invocation.destination, invocation.request, invocation.timeout) => result,
        signal = signal::wait_for_shutdown() => {
            info!(?signal, "Interrupted before a reply arrived");
            telemetry::shutdown();
            return Ok(());
        }
    };

    telemetry::shutdown();

    match result {
        Ok(reply) => {
            let value = reply.into_value().unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, destination = %invocation.destination, "Request failed");
            Err(e.into())
        }
    }
}
