//! Demo binary bridging one chat identity to JSON lines.
//!
//! Every normalized event is printed to stdout as one JSON document per line.
//! Lines read from stdin are sent to the first joined room.

mod cli;

use std::{num::NonZeroU32, time::Duration};

use chatgate::{
    config::SessionConfig,
    credentials::{AuthMethod, Credentials},
    session::{MessageKind, Session},
};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

fn credentials(cli: &cli::Cli) -> Credentials {
    let mut credentials = Credentials::new(cli.nick.clone(), cli.server.clone());
    credentials.port = cli.port;
    credentials.secure = cli.secure;
    credentials.real_name.clone_from(&cli.real_name);
    credentials.auth_secret.clone_from(&cli.password);
    credentials.auth_method = cli.sasl.then_some(AuthMethod::SaslPlain);
    credentials
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "serving metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(_addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    warn!("built without the metrics feature; ignoring --metrics-addr");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only events.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = cli::Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let config = SessionConfig::default()
        .connect_timeout(Duration::from_secs(cli.connect_timeout))
        .outbound_rate(cli.rate.and_then(NonZeroU32::new));
    let session = Session::builder(credentials(&cli))
        .config(config)
        .on_event(|event| match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(err) => warn!(error = %err, "failed to serialize event"),
        })
        .on_identity_update(|credentials| async move {
            info!(nick = %credentials.nick, "identity changed");
            Ok(())
        })
        .build();

    session.connect().await?;
    for room in &cli.rooms {
        session.join(room).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let Some(room) = cli.rooms.first() else {
            warn!("no room joined; ignoring input");
            continue;
        };
        if let Err(err) = session.send(room, MessageKind::Message, &Value::from(line)).await {
            warn!(error = %err, "send failed");
        }
    }

    session.disconnect().await?;
    Ok(())
}
