//! Clausewitz Pipeline - containerised build, test and native release
//! pipeline for the paradox-clausewitz-sav save-game CLI.

use clausewitz_pipeline::cli;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = cli::run().await;
    process::exit(exit_code);
}
