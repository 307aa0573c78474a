//! Speedtest Recorder - scheduled entry point
//!
//! Runs one measurement and stores it. Failures are written to the log file
//! next to the executable; the exit status is always 0.

use speedtest_recorder::{
    app::{log_outcome, program_location},
    App, LiveBackends, Logger, LOGGER_NAME,
};

#[tokio::main]
async fn main() {
    let (work_dir, program_name) = program_location();
    let log_path = work_dir.join(format!("{}.log", program_name));

    let logger = match Logger::rotating_file(LOGGER_NAME, &log_path) {
        Ok(logger) => logger,
        Err(e) => {
            let logger = Logger::stderr(LOGGER_NAME);
            logger.warn(&format!("{}; logging to stderr instead", e));
            logger
        }
    };

    logger.info(&format!(
        "----Starting speed test---- {}",
        speedtest_recorder::version_line()
    ));

    let outcome = App::new(work_dir, &logger, LiveBackends).run().await;
    log_outcome(&logger, &outcome);

    logger.info("====Finished speed test====");
}
