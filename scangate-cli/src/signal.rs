//! Interrupt handling

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancels `token` on Ctrl+C or SIGTERM
pub async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, cancelling the batch"),
        _ = terminate => warn!("Received SIGTERM, cancelling the batch"),
        _ = token.cancelled() => return,
    }

    token.cancel();
}
