use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;

/// Installs the process-wide logger.
///
/// `level` applies unless `RUST_LOG` is set, in which case that wins.
/// Calling this more than once is harmless.
pub fn init(level: LevelFilter) {
    let env = Env::default().default_filter_or(level.as_str());
    let result = Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if result.is_ok() {
        log::info!("Logging initialized");
    }
}
