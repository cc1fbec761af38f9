use log::debug;

pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Config {
    pub mode: Mode,
    pub port: u16,
    /// Lot created at start-up, if any.
    pub capacity: Option<u32>,
    pub server_url: String,
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

impl Config {
    /// Reads `--mode`, `--p`, `--capacity` and `--s`. `env_port` is the `PORT`
    /// variable and only applies when `--p` is absent or unparsable.
    pub fn from_args(args: &[String], env_port: Option<String>) -> Self {
        let mode = match flag_value(args, "--mode").map(|m| m.to_ascii_lowercase()) {
            Some(m) if m == "client" || m == "c" => Mode::Client,
            _ => Mode::Server,
        };
        let port = flag_value(args, "--p")
            .and_then(|p| p.parse().ok())
            .or_else(|| env_port.and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT);
        let capacity = flag_value(args, "--capacity")
            .and_then(|c| c.parse::<u32>().ok())
            .filter(|c| *c > 0);
        let server_url = flag_value(args, "--s")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(DEFAULT_SERVER_URL.to_string());

        let config = Self { mode, port, capacity, server_url };
        debug!("config resolved = {:?}", config);
        config
    }
}
