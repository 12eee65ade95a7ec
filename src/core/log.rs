//! Purpose: Route plugin diagnostics to the host log feature or to `tracing`.
//! Exports: `Logger`, `Level`, `init_tracing`.
//! Role: Equivalent of an LV2 log helper; hides the variadic host `printf`.
//! Invariants: Host messages are passed through a fixed `"%s"` format.
//! Invariants: Without a host log, events go to a stderr `tracing` subscriber installed once.

use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::core::sys::{
    LV2_LOG__Error, LV2_LOG__Note, LV2_LOG__Trace, LV2_LOG__Warning, LV2_Log_Log, LV2_URID,
    LV2_URID_Map,
};
use crate::core::urid::map_uri;

pub const LOG_FILTER_ENV: &str = "LV2_STATE_TEST_LOG";

static TRACING_INIT: Once = Once::new();

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Warning,
    Note,
    Trace,
}

#[derive(Clone, Copy, Debug)]
struct LevelUrids {
    error: LV2_URID,
    warning: LV2_URID,
    note: LV2_URID,
    trace: LV2_URID,
}

impl LevelUrids {
    fn get(&self, level: Level) -> LV2_URID {
        match level {
            Level::Error => self.error,
            Level::Warning => self.warning,
            Level::Note => self.note,
            Level::Trace => self.trace,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Sink {
    Host {
        log: NonNull<LV2_Log_Log>,
        urids: LevelUrids,
    },
    Tracing,
}

#[derive(Clone, Copy, Debug)]
pub struct Logger {
    sink: Sink,
}

impl Logger {
    /// Builds a logger that writes through `log` when the host offered one.
    ///
    /// # Safety
    /// `map` must be a live host URID map and `log`, when present, must stay
    /// valid for as long as the logger is used.
    pub unsafe fn new(map: &LV2_URID_Map, log: Option<NonNull<LV2_Log_Log>>) -> Self {
        match log {
            Some(log) => {
                let urids = unsafe {
                    LevelUrids {
                        error: map_uri(map, LV2_LOG__Error),
                        warning: map_uri(map, LV2_LOG__Warning),
                        note: map_uri(map, LV2_LOG__Note),
                        trace: map_uri(map, LV2_LOG__Trace),
                    }
                };
                Self {
                    sink: Sink::Host { log, urids },
                }
            }
            None => Self::tracing(),
        }
    }

    pub fn tracing() -> Self {
        init_tracing();
        Self {
            sink: Sink::Tracing,
        }
    }

    pub fn uses_host_log(&self) -> bool {
        matches!(self.sink, Sink::Host { .. })
    }

    pub fn log(&self, level: Level, message: &str) {
        match self.sink {
            Sink::Host { log, urids } => {
                let text = CString::new(format!("{}\n", message.replace('\0', "")))
                    .unwrap_or_default();
                unsafe {
                    let log = log.as_ref();
                    (log.printf)(log.handle, urids.get(level), c"%s".as_ptr(), text.as_ptr());
                }
            }
            Sink::Tracing => match level {
                Level::Error => tracing::error!("{message}"),
                Level::Warning => tracing::warn!("{message}"),
                Level::Note => tracing::info!("{message}"),
                Level::Trace => tracing::trace!("{message}"),
            },
        }
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    pub fn note(&self, message: &str) {
        self.log(Level::Note, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::Trace, message);
    }
}

/// Installs the stderr subscriber on first call; later calls are no-ops.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
