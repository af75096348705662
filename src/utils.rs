//utils for graceful shutdown and log setup shared by the binary's commands
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A token cancelled on Ctrl-C. The engine treats it like a `Panic`.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received");
                tc.cancel();
            }
            Err(err) => error!(%err, "failed to install ctrl-c handler"),
        }
    });
    token
}

/// Logs go to stderr so stdout stays free for the message stream.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
}
