use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Install handlers for SIGHUP, SIGINT, SIGTERM and SIGQUIT and spawn a task
/// that cancels `token` on the first one received.
///
/// Handlers are registered before returning, so a signal arriving right after
/// this call is not lost. The task also ends if `token` is cancelled by
/// someone else.
pub fn install_signal_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let signals = Signals::install()?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            name = signals.recv() => {
                tracing::info!(signal = name, "signal received");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    }))
}

#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<&'static str>().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = install_signal_listener(token.clone()).unwrap();
        assert!(!token.is_cancelled());

        token.cancel();
        handle.await.unwrap();
    }
}
