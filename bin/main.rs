use tracing::info;
use tracing::trace;
use tracing_subscriber;

use clap::{value_t, App, Arg};

use std::path::Path;

use boreal::server::node;
use boreal::server::settings::Settings;
use boreal::Result;

const DEFAULT_HOME_DIR: &str = "etc";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_target(true)
        .compact()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = App::new("boreal")
        .version("0.1")
        .about("Runs a boreal node core")
        .arg(
            Arg::with_name("listener-ip")
                .short("a")
                .long("listener-ip")
                .value_name("LISTENER_IP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("ledger-peer")
                .short("p")
                .long("ledger-peer")
                .value_name("LEDGER_PEER")
                .multiple(true),
        )
        .arg(
            Arg::with_name("keypair")
                .short("k")
                .long("keypair")
                .value_name("KEYPAIR")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("max-transactions")
                .long("max-transactions")
                .value_name("MAX_TRANSACTIONS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("proposal-delay-ms")
                .long("proposal-delay-ms")
                .value_name("PROPOSAL_DELAY_MS")
                .takes_value(true),
        )
        .arg(Arg::with_name("home").short("h").long("home").takes_value(true).required(false))
        .get_matches();

    let home_dir = matches.value_of("home").unwrap_or(DEFAULT_HOME_DIR);
    let mut settings = Settings::new(Path::new(home_dir)).expect("failed to load configuration.");

    if let Some(ip) = matches.value_of("listener-ip") {
        trace!("CLI arg for listener-ip provided: {}", ip);
        settings.listener_ip = ip.to_owned();
    }

    if let Some(peers) = matches.values_of("ledger-peer") {
        trace!("CLI arg for ledger-peer provided");
        settings.ledger_peers = peers.map(|peer| peer.to_owned()).collect();
    }

    if let Some(kp) = matches.value_of("keypair") {
        trace!("CLI arg for keypair provided: {}", kp);
        settings.keypair = Some(kp.to_owned());
    }

    if matches.is_present("max-transactions") {
        settings.max_number_of_transactions =
            value_t!(matches.value_of("max-transactions"), u32).unwrap_or_else(|e| e.exit());
    }

    if matches.is_present("proposal-delay-ms") {
        settings.proposal_delay_ms =
            value_t!(matches.value_of("proposal-delay-ms"), u64).unwrap_or_else(|e| e.exit());
    }

    let sys = actix::System::new();
    sys.block_on(async move {
        node::run(settings).unwrap();

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt()).unwrap();
            let mut sigterm = signal(SignalKind::terminate()).unwrap();

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await.unwrap();
            "Ctrl+C"
        };
        info!(target: "boreal", "Got {}, stopping...", sig);

        actix::System::current().stop();
    });
    sys.run().unwrap();

    Ok(())
}
