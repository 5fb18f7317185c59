//! Logger setup for the CLI. Library code only talks to the `log` facade.

use log::LevelFilter;

/// Install an `env_logger` backend at `level`. Later calls only move the
/// global level.
pub fn init(level: LevelFilter) {
    let installed = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
    if installed.is_err() {
        log::debug!("logger already installed");
    }
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_only_moves_the_level() {
        init(LevelFilter::Warn);
        assert_eq!(log::max_level(), LevelFilter::Warn);
        init(LevelFilter::Debug);
        assert_eq!(log::max_level(), LevelFilter::Debug);
    }
}
