use bluemaestro_listener::app::{Options, RealScanner, run_with_io};
use clap::Parser;
use env_logger::Env;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd, Telegraf execd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    // Logs go to stderr so they never mix with the data on stdout
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let options = Options::parse();
    log::debug!("Starting with {:?}", options);

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();

    match run_with_io(options, &RealScanner, &mut out, &mut err).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
