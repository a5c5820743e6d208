use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Exit code for a run cut short by a signal (shell convention for SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Bridges process signals into a migration run: SIGINT or SIGTERM cancels
/// the run token, the processor finishes its in-flight batch, and the flag
/// tells `main` to exit with the interrupted code.
pub struct RunInterrupt {
    token: CancellationToken,
    interrupted: Arc<AtomicBool>,
}

impl RunInterrupt {
    /// Spawns the signal listener and hands back the handle whose token the
    /// run loop is driven with.
    pub fn install() -> Self {
        let interrupt = RunInterrupt {
            token: CancellationToken::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        };

        let token = interrupt.token.clone();
        let flag = interrupt.interrupted.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                signal::ctrl_c()
                    .await
                    .expect("Failed to install SIGINT handler");
            };

            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C), stopping after the current batch");
                }
                _ = terminate => {
                    info!("Received SIGTERM, stopping after the current batch");
                }
            }

            interrupt_run(&token, &flag);
        });

        interrupt
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

fn interrupt_run(token: &CancellationToken, flag: &AtomicBool) {
    flag.store(true, Ordering::SeqCst);
    token.cancel();
}
