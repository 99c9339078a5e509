mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use vacancy_relay::block::BlockController;
use vacancy_relay::notify::Notifier;
use vacancy_relay::server::{router, AppState};
use vacancy_relay::store::Store;

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            };
            cancel.cancel();
        });
    }

    if let Err(error) = begin(args, cancel).await {
        error!(error = %format!("{error:#}"), "encountered runtime error");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn begin(args: Args, cancel: CancellationToken) -> Result<()> {
    let store = Store::open(&args.database).await.with_context(|| {
        format!("opening database {}", args.database.display())
    })?;
    info!(path = %args.database.display(), "database ready");

    let block = BlockController::new(
        store.clone(),
        Notifier::new(args.notify_url.clone()),
        args.block_config(),
    );
    let app = router(AppState::new(store.clone(), block.clone(), args.target));

    let listener = TcpListener::bind((args.listen, args.port))
        .await
        .context("binding listener")?;
    info!(addr = %listener.local_addr()?, "listening");

    // Serve until an exit signal arrives, then let in-flight requests finish.
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("serving");

    block.shutdown();
    store.close().await;
    info!("database closed");

    served
}
