//! SIGINT/SIGTERM handling.
//!
//! The first signal prints "Stopped by user" and fires the cancel token so the
//! running step unwinds; a second signal falls back to the default action.

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::io::output::DirectWriter;

pub const STOPPED_MESSAGE: &str = "Stopped by user";

#[cfg(unix)]
pub fn install_signal_handler(cancel: CancelToken, direct: DirectWriter) -> Result<()> {
    use anyhow::Context;
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::{debug, warn};

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("register signal handlers")?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if cancel.is_cancelled() {
                debug!(signal, "second signal, using default action");
                if let Err(e) = signal_hook::low_level::emulate_default_handler(signal) {
                    warn!(err = %e, "emulate default signal handler failed");
                    std::process::exit(crate::exit_codes::CANCELLED);
                }
                continue;
            }
            debug!(signal, "first signal, cancelling");
            direct.line("");
            direct.line(STOPPED_MESSAGE);
            cancel.cancel();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handler(_cancel: CancelToken, _direct: DirectWriter) -> Result<()> {
    Ok(())
}
