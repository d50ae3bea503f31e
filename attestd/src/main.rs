//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

mod config;

use attestd_service::{
    server::{TcpServer, UnixSocketServer},
    AttestationService, Binding,
};
use clap::Parser;
use config::{BindingKind, DaemonConfig};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "ATTESTD_CONFIG", value_parser = config::load_json::<DaemonConfig>)]
    config: Option<DaemonConfig>,

    /// Transport to listen on. Overrides the configuration file.
    #[arg(long, env = "ATTESTD_BINDING", value_enum)]
    binding: Option<BindingKind>,

    /// Socket path or `host:port` to listen on. Overrides the configuration
    /// file.
    #[arg(long, env = "ATTESTD_ADDRESS")]
    address: Option<String>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, env = "ATTESTD_VERBOSE")]
    verbose: bool,
}

async fn signal_handler(mut signals: Signals, cancellation_token: CancellationToken) {
    if let Some(signal) = signals.next().await {
        log::info!("received signal {}, shutting down", signal);
        cancellation_token.cancel();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Args { config, binding, address, verbose } = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" }),
    )
    .init();

    // The command-line arguments override the values from the config file.
    let mut config = config.unwrap_or_default();
    if let Some(binding) = binding {
        config.binding = binding;
    }
    if let Some(address) = address {
        config.address = Some(address);
    }

    let service = AttestationService::new(config.load_service_config()?);
    let cancellation_token = CancellationToken::new();

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let signals_task = tokio::spawn(signal_handler(signals, cancellation_token.clone()));

    match config.binding() {
        Binding::Socket(path) => {
            UnixSocketServer::bind(&path).await?.serve(service, cancellation_token).await?
        }
        Binding::Network(address) => {
            TcpServer::bind(&address).await?.serve(service, cancellation_token).await?
        }
    }

    handle.close();
    signals_task.await?;
    Ok(())
}
