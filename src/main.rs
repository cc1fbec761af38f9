use std::env;
use log::debug;
use crate::config::{Config, Mode};

mod server;
mod core;
mod clients;
mod errors;
mod config;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args, env::var("PORT").ok());
    debug!("mode found = {:?}", config.mode);
    match config.mode {
        Mode::Server => server::parking_server::run(config),
        Mode::Client => clients::shell::run(config),
    }
}
