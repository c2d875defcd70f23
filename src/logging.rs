use std::io;

use fern::colors::{Color, ColoredLevelConfig};

/// Install a stderr logger at `level`. Installing twice keeps the first
/// logger, so tests can call this freely.
pub fn init(level: log::LevelFilter) {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    let res = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();

    if res.is_err() {
        log::trace!("logger already installed");
    }
}
