use std::fs::File;

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;

/// Install the global tracing subscriber.
///
/// Logs go to stdout, or to `<date>_friedman_log.txt` in the working directory when file
/// logging is enabled.
pub fn init_logger(config: &Configuration) -> anyhow::Result<()> {
    let (writer, ansi) = if config.log {
        let file_name = get_log_file_name()?;
        let file = File::create(&file_name)
            .with_context(|| format!("could not create log file {file_name}"))?;
        (BoxMakeWriter::new(file), false)
    } else {
        (BoxMakeWriter::new(std::io::stdout), true)
    };

    // the local offset cannot always be determined in multi-threaded processes
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid timer format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_ansi(ansi)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber)
        .context("could not set global default tracing subscriber")
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_friedman_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_friedman_log.txt"), "{name}");
        // [year]-[month]-[day]_[hour]:[minute]:[second]
        assert_eq!(name.len(), "2024-07-25_10:00:00_friedman_log.txt".len());
    }
}
