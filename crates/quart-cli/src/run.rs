//! Turns parsed arguments into a running session.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use quart_core::Config;
use quart_core::config::load_config;
use quart_core::tracing_init::{DEFAULT_FILTER, filter_for_level, init_tracing};
use quart_crypto::{KeyDirectory, SigningIdentity};
use quart_session::{
    ChannelConfig, ChannelModel, Endpoints, Exchange, Payload, QuantumEndpoint, ReceiverOptions,
    SessionOutcome, connect, run_receiver, run_sender,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::{
    Cli, Command, CommonArgs, RECEIVER_DEFAULTS, ReceiveArgs, RoleDefaults, SENDER_DEFAULTS,
    SendArgs,
};

/// Exit status when the security gate rejects the exchange.
pub const ABORTED_EXIT: u8 = 2;

/// Largest raw qubit count a receiver accepts from the sender's metadata.
pub const MAX_QUBITS: usize = 1 << 26;

/// File name used for `--text` payloads.
pub const TEXT_FILENAME: &str = "message.txt";

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let config = resolve_config(load_config(Some(&cwd))?, &cli.common)?;

    let filter = cli
        .common
        .log_level
        .as_deref()
        .or_else(|| (!config.log_level.is_empty()).then_some(config.log_level.as_str()))
        .map_or_else(|| DEFAULT_FILTER.to_string(), filter_for_level);
    init_tracing(&filter, cli.common.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting quart");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling session");
            on_signal.cancel();
        }
    });

    let outcome = match cli.command {
        Command::Send(args) => send(&cli.common, &config, args, cancel).await?,
        Command::Receive(args) => receive(&cli.common, &config, args, cancel).await?,
    };
    info!(completed = outcome.is_completed(), "Session finished");

    Ok(match outcome {
        SessionOutcome::Completed(_) => ExitCode::SUCCESS,
        SessionOutcome::Aborted(decision) => {
            report_abort(decision.max_key, decision.requested);
            ExitCode::from(ABORTED_EXIT)
        }
    })
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn resolve_config(mut config: Config, common: &CommonArgs) -> anyhow::Result<Config> {
    if let Some(security) = common.security {
        config.params.security = security;
    }
    if let Some(correctness) = common.correctness {
        config.params.correctness = correctness;
    }
    if let Some(secs) = common.timeout {
        config.network.receive_timeout_secs = secs;
    }
    if let Some(dir) = &common.keys_dir {
        config.keys_dir = Some(dir.clone());
    }
    config.validate().context("invalid settings")?;
    Ok(config)
}

/// Fill unset names and addresses from the role defaults.
pub fn endpoints(common: &CommonArgs, defaults: RoleDefaults, quantum: QuantumEndpoint) -> Endpoints {
    Endpoints {
        name: common.name.clone().unwrap_or_else(|| defaults.name.into()),
        peer: common.peer.clone().unwrap_or_else(|| defaults.peer.into()),
        listen: common.listen.clone().unwrap_or_else(|| defaults.listen.into()),
        peer_addr: common
            .peer_addr
            .clone()
            .unwrap_or_else(|| defaults.peer_addr.into()),
        quantum,
    }
}

/// Build the payload from exactly one of `FILE`, `--text` or `--bits`.
pub async fn load_payload(args: &SendArgs) -> anyhow::Result<Payload> {
    match (&args.file, &args.text, args.bits) {
        (Some(path), None, None) => {
            let contents = tokio::fs::read(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no usable file name", path.display()))?;
            Ok(Payload::File {
                name: name.to_string(),
                contents,
            })
        }
        (None, Some(text), None) => Ok(Payload::File {
            name: TEXT_FILENAME.into(),
            contents: text.clone().into_bytes(),
        }),
        (None, None, Some(bits)) => Ok(Payload::KeyOnly { bits }),
        _ => bail!("give exactly one of FILE, --text or --bits"),
    }
}

/// Signing identity: from a key file when asked, otherwise fresh.
pub fn identity(common: &CommonArgs, name: &str) -> anyhow::Result<SigningIdentity> {
    let path = match (&common.identity, common.persistent_identity) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(persistent_identity_path(name)?),
        (None, false) => None,
    };
    match path {
        Some(path) => SigningIdentity::load_or_generate(&path)
            .with_context(|| format!("cannot load identity from {}", path.display())),
        None => Ok(SigningIdentity::generate()),
    }
}

fn persistent_identity_path(name: &str) -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir().context("no user config directory")?;
    Ok(dir.join("quart").join(format!("{name}.key")))
}

async fn send(
    common: &CommonArgs,
    config: &Config,
    args: SendArgs,
    cancel: CancellationToken,
) -> anyhow::Result<SessionOutcome> {
    if !(0.0..=1.0).contains(&args.noise) {
        bail!("--noise must be in [0, 1], got {}", args.noise);
    }
    let payload = load_payload(&args).await?;
    let model = ChannelModel {
        noise: args.noise,
        intercept_resend: args.eavesdrop,
    };
    let endpoints = endpoints(
        common,
        SENDER_DEFAULTS,
        QuantumEndpoint::Dial(args.quantum_addr),
    );
    let mut link = open(common, config, &endpoints, model, cancel).await?;

    let outcome = run_sender(
        &mut link.channel,
        &mut link.quantum,
        &config.params,
        payload,
        &mut StdRng::from_entropy(),
    )
    .await?;
    if let SessionOutcome::Completed(exchange) = &outcome {
        report_key(exchange);
    }
    Ok(outcome)
}

async fn receive(
    common: &CommonArgs,
    config: &Config,
    args: ReceiveArgs,
    cancel: CancellationToken,
) -> anyhow::Result<SessionOutcome> {
    let endpoints = endpoints(
        common,
        RECEIVER_DEFAULTS,
        QuantumEndpoint::Listen(args.quantum_listen),
    );
    let options = ReceiverOptions {
        name: endpoints.name.clone(),
        out_dir: args.out_dir,
        max_qubits: MAX_QUBITS,
    };
    let mut link = open(common, config, &endpoints, ChannelModel::default(), cancel).await?;

    let outcome = run_receiver(
        &mut link.channel,
        &mut link.quantum,
        &options,
        &mut StdRng::from_entropy(),
    )
    .await?;
    if let SessionOutcome::Completed(exchange) = &outcome {
        match &exchange.delivered {
            Some(path) => report_delivery(path),
            None => report_key(exchange),
        }
    }
    Ok(outcome)
}

async fn open(
    common: &CommonArgs,
    config: &Config,
    endpoints: &Endpoints,
    model: ChannelModel,
    cancel: CancellationToken,
) -> anyhow::Result<quart_session::Connected> {
    let identity = identity(common, &endpoints.name)?;
    let keys = KeyDirectory::new(config.keys_dir());
    let channel_config = ChannelConfig::from(&config.network);
    info!(
        name = %endpoints.name,
        peer = %endpoints.peer,
        keys_dir = %keys.root().display(),
        timeout = ?Duration::from_secs(config.network.receive_timeout_secs),
        "Connecting to peer"
    );
    connect(endpoints, identity, &keys, &channel_config, model, cancel)
        .await
        .with_context(|| format!("cannot connect to {} at {}", endpoints.peer, endpoints.peer_addr))
}

#[allow(clippy::print_stdout)]
fn report_key(exchange: &Exchange) {
    println!("{}", exchange.key.to_hex());
}

#[allow(clippy::print_stdout)]
fn report_delivery(path: &Path) {
    println!("{}", path.display());
}

#[allow(clippy::print_stderr)]
fn report_abort(max_key: f64, requested: usize) {
    eprintln!(
        "Exchange aborted: error rate allows at most {max_key:.1} secure bits, {requested} needed"
    );
}
