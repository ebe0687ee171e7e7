use clap::Parser;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cnetz_config::{toml_config, SharedConfig};
use cnetz_core::debug;
use cnetz_entities::cc::CcBs;
use cnetz_entities::coder::CoderBs;
use cnetz_entities::line::{LineBs, LineHandle};
use cnetz_entities::phy::PhyBs;
use cnetz_entities::MessageRouter;

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

/// Build the base-station stack
fn build_bs_stack(cfg: &SharedConfig) -> (MessageRouter, LineHandle) {
    let mut router = MessageRouter::new(cfg.clone());

    let phy = PhyBs::new(cfg.clone());
    let coder = CoderBs::new(cfg.clone());
    let cc = CcBs::new(cfg.clone());
    let (line, line_handle) = LineBs::new(cfg.clone());

    router.register_entity(Box::new(phy));
    router.register_entity(Box::new(coder));
    router.register_entity(Box::new(cc));
    router.register_entity(Box::new(line));

    (router, line_handle)
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "C-Netz Feststation",
    long_about = "Runs the C-Netz base-station protocol engine using the provided TOML configuration"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with cell/channel parameters")]
    config: String,
}

fn main() {
    eprintln!("░█▀▀░░░░░█▀█░█▀▀░▀█▀░▀▀█░░░░░█▀▀░█▀▀░█▀▀░▀█▀░█▀▀░▀█▀░█▀█░▀█▀░▀█▀░█▀█░█▀█");
    eprintln!("░█░░░▄▄▄░█░█░█▀▀░░█░░▄▀░░▄▄▄░█▀▀░█▀▀░▀▀█░░█░░▀▀█░░█░░█▀█░░█░░░█░░█░█░█░█");
    eprintln!("░▀▀▀░░░░░▀░▀░▀▀▀░░▀░░▀▀▀░░░░░▀░░░▀▀▀░▀▀▀░░▀░░▀▀▀░░▀░░▀░▀░░▀░░▀▀▀░▀▀▀░▀░▀\n");

    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = debug::setup_logging_default(cfg.config().debug_log.clone());

    let (mut router, _line_handle) = build_bs_stack(&cfg);

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    // The line handle would be passed to the network integration; the
    // stand-alone binary keeps it alive so the bridge stays connected.
    router.run_stack(None, Some(running));
    // router drops here, entities released their transactions in shutdown
}
