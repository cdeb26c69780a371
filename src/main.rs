use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pathmon::cli::Args;
use pathmon::lookup::{ReverseDns, run_rdns_worker};
use pathmon::net::{EndpointConfig, Error, FamilySet, IcmpEndpoint};
use pathmon::state::HopSnapshot;
use pathmon::trace::Tracer;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(args.debug);

    let config = EndpointConfig {
        families: if args.ipv6 { FamilySet::V6 } else { FamilySet::V4 },
        read_timeout: args.timeout_duration(),
        ..EndpointConfig::default()
    };
    let endpoint = match IcmpEndpoint::new(config) {
        Ok(endpoint) => Arc::new(endpoint),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    endpoint.serve(cancel.clone());

    let tracer = Arc::new(Tracer::new(endpoint, cancel.clone()));

    if !args.no_dns {
        tokio::spawn(run_rdns_worker(
            Arc::new(ReverseDns::new()),
            tracer.path_handle(),
            cancel.clone(),
        ));
    }

    // Periodic snapshot printer standing in for the full-screen UI
    let printer = tokio::spawn(print_snapshots(tracer.clone(), cancel.clone()));

    let result = tracer.run(&args.target, args.max_hops).await;

    cancel.cancel();
    printer.await.ok();

    match result {
        Ok(()) => Ok(()),
        Err(e @ (Error::Resolve { .. } | Error::UnsupportedFamily(_))) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(Error::MaxTtlExceeded(max)) => {
            eprintln!("Target not reached within {} hops", max);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "pathmon=debug" } else { "pathmon=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print a hop table once a second until shutdown.
async fn print_snapshots(tracer: Arc<Tracer>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let snapshots: Vec<HopSnapshot> =
                    tracer.hops().iter().map(|hop| hop.snapshot()).collect();
                if snapshots.is_empty() {
                    continue;
                }
                for snap in snapshots {
                    let addr = match (&snap.display_name, snap.ip) {
                        (Some(name), _) => name.clone(),
                        (None, Some(ip)) => ip.to_string(),
                        (None, None) => "*".to_string(),
                    };
                    println!(
                        "{:3}  {:40}  {:>4}/{:<4}  {:>5.1}% loss  avg {:>7.2}ms  med {:>7.2}ms",
                        snap.ttl,
                        addr,
                        snap.sent,
                        snap.received,
                        snap.loss * 100.0,
                        snap.avg_rtt.as_secs_f64() * 1000.0,
                        snap.median_rtt.as_secs_f64() * 1000.0,
                    );
                }
                println!("---");
            }
        }
    }
}
