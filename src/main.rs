mod cli;
mod commands;
mod directory;
mod error;
mod extract;
mod locator;
mod mft;
mod models;
mod output;
mod session;
mod tree;
mod volume;

#[cfg(test)]
mod testkit;

use clap::Parser;
use cli::Cli;
use locator::MountOptions;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG важнее флага -v
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let code = if cli.list {
        commands::devices::run(cli.json)
    } else if let Some(image) = &cli.shell {
        let options = MountOptions {
            scan_limit: cli.scan_limit,
        };
        commands::shell::run(image, options, cli.json)
    } else {
        eprintln!("[!] Укажите --list или --shell <IMAGE> (см. --help)");
        2
    };
    std::process::exit(code);
}
