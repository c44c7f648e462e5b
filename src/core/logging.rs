use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::AppPaths;

const LOG_FILE_PREFIX: &str = "assist.log";

/// Used when `RUST_LOG` is unset. HTTP client internals stay quiet so long
/// polls do not flood the log.
const DEFAULT_DIRECTIVES: &str = "info,support_assist=info,hyper=warn,reqwest=warn";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Console output plus a daily-rolling file under `paths.log_dir`.
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init(paths: &AppPaths) {
    if let Err(e) = std::fs::create_dir_all(&paths.log_dir) {
        eprintln!("Cannot create log dir {}: {}", paths.log_dir.display(), e);
    }

    let appender = tracing_appender::rolling::daily(&paths.log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    let console = tracing_subscriber::fmt::layer().with_target(false);
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file)
        .try_init();
}
