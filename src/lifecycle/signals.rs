//! OS signal handling.
//!
//! SIGTERM, SIGQUIT and SIGINT request shutdown; SIGHUP requests that the
//! configuration file be read again. Elsewhere only Ctrl-C is observed.

use std::io;

/// What a received signal asks the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Reload,
}

/// Registered signal streams. Create once, then call [`Signals::recv`] in a loop.
#[cfg(unix)]
pub struct Signals {
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> Signal {
        let (name, signal) = tokio::select! {
            _ = self.terminate.recv() => ("SIGTERM", Signal::Terminate),
            _ = self.quit.recv() => ("SIGQUIT", Signal::Terminate),
            _ = self.interrupt.recv() => ("SIGINT", Signal::Terminate),
            _ = self.hangup.recv() => ("SIGHUP", Signal::Reload),
        };
        tracing::info!(signal = name, "Signal received");
        signal
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn new() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> Signal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        Signal::Terminate
    }
}
