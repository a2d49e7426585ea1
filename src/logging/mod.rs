//! Logging initialization using `tracing` and `tracing-subscriber`.

use std::path::Path;

use tracing::{debug, info};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Counts over one access set, taken when the set's owner closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessSetSnapshot {
    pub batons: usize,
    pub write_locked: usize,
    pub physical_locks: usize,
    pub missing: usize,
}

/// Initialize global tracing subscriber. Safe to call multiple times; subsequent
/// calls will no-op.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

/// Emit the shape of an access set. Sets holding more than one baton are
/// reported at info, single batons at debug.
pub fn log_access_set_snapshot(owner: &Path, snapshot: &AccessSetSnapshot) {
    if snapshot.batons + snapshot.missing > 1 {
        info!(
            target = "wcadm::access",
            owner = %owner.display(),
            batons = snapshot.batons,
            write_locked = snapshot.write_locked,
            physical_locks = snapshot.physical_locks,
            missing = snapshot.missing,
            "access_set_snapshot"
        );
    } else {
        debug!(
            target = "wcadm::access",
            owner = %owner.display(),
            batons = snapshot.batons,
            write_locked = snapshot.write_locked,
            physical_locks = snapshot.physical_locks,
            "access_set_snapshot"
        );
    }
}
