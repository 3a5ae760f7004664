use crate::{CancelRegistration, CommandCanceler};
use anyhow::Context;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Asks the server to cancel the running command when the signal fires.
///
/// Advisory only: disposing does not wait for the server, nor does it guarantee the request was
/// sent. A transport that stopped responding is handled by
/// [`AbnormalCloseGuard`](crate::AbnormalCloseGuard).
pub struct CancelCommandRequest {
    registration: CancelRegistration,
}

impl CancelCommandRequest {
    pub fn new(
        canceler: Box<dyn CommandCanceler>,
        signal: &CancellationToken,
        runtime: &Handle,
    ) -> Self {
        Self {
            registration: CancelRegistration::register(signal, runtime, move || {
                log::debug!("Requesting the cancellation of the running command");
                if let Err(e) = canceler
                    .cancel()
                    .context("Could not request the cancellation of the command")
                {
                    log::error!("{:#}", e);
                }
            }),
        }
    }

    pub fn dispose(&mut self) {
        self.registration.dispose();
    }
}
