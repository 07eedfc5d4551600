//! Server configuration (spec.md §6 "CLI / env / persisted state: out of
//! scope for the core" — this is the ambient layer that sits around that
//! core).
//!
//! Grounded on the teacher's `redis/config.rs::load_server_config`
//! directive-per-line parser (`key value [value...]`, `#`-comments,
//! blank lines skipped), kept but rebuilt around a typed `Config` struct
//! instead of mutating `RedisServer` fields directly. The CLI surface is
//! new, built with `clap::Parser` the way the rest of the ecosystem does
//! it rather than hand-rolling `std::env::args()`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "emberkv-server", about = "A Redis-wire-compatible in-memory data store")]
pub struct Cli {
    /// Path to a config file in the `directive value...` format.
    #[arg(long)]
    pub config: Option<String>,

    /// TCP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind to.
    #[arg(long)]
    pub bind: Option<String>,

    /// `host:port` of a master to replicate from.
    #[arg(long = "replicaof")]
    pub replica_of: Option<String>,

    /// Path to an append-only file to write committed commands to.
    #[arg(long)]
    pub appendonly_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub replica_of: Option<(String, u16)>,
    pub appendonly_path: Option<String>,
    /// Free-form directives not otherwise modeled, surfaced through
    /// `CONFIG GET` (spec.md §6 "Server").
    extra: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6379,
            bind_addr: "127.0.0.1".to_string(),
            replica_of: None,
            appendonly_path: None,
            extra: HashMap::new(),
        }
    }
}

impl Config {
    /// Builds a `Config` from (in increasing precedence) a config file, if
    /// given, then CLI flags.
    pub fn load(cli: &Cli) -> std::io::Result<Config> {
        let mut cfg = Config::default();
        if let Some(path) = &cli.config {
            cfg.apply_file(path)?;
        }
        if let Some(port) = cli.port {
            cfg.port = port;
        }
        if let Some(bind) = &cli.bind {
            cfg.bind_addr = bind.clone();
        }
        if let Some(spec) = &cli.replica_of {
            cfg.replica_of = parse_host_port(spec);
        }
        if let Some(path) = &cli.appendonly_path {
            cfg.appendonly_path = Some(path.clone());
        }
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &str) -> std::io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let argv: Vec<&str> = trimmed.split_whitespace().collect();
            match argv[0].to_ascii_lowercase().as_str() {
                "port" if argv.len() == 2 => {
                    if let Ok(p) = argv[1].parse() {
                        self.port = p;
                    }
                }
                "bind" if argv.len() == 2 => self.bind_addr = argv[1].to_string(),
                "replicaof" if argv.len() == 3 => {
                    self.replica_of = parse_host_port(&format!("{}:{}", argv[1], argv[2]));
                }
                "appendonly_path" if argv.len() == 2 => {
                    self.appendonly_path = Some(argv[1].to_string());
                }
                directive if argv.len() >= 2 => {
                    self.extra.insert(directive.to_string(), argv[1..].join(" "));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Backs `CONFIG GET <name>` (spec.md §6 "Server"). Known fields answer
    /// from their typed value; anything else falls back to the directives
    /// collected from the config file.
    pub fn get(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "port" => Some(self.port.to_string()),
            "bind" => Some(self.bind_addr.clone()),
            _ => self.extra.get(&name.to_ascii_lowercase()).cloned(),
        }
    }
}

fn parse_host_port(spec: &str) -> Option<(String, u16)> {
    let (host, port) = spec.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_a_config_file() {
        let cli = Cli {
            config: None,
            port: None,
            bind: None,
            replica_of: None,
            appendonly_path: None,
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.port, 6379);
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = std::env::temp_dir().join(format!("emberkv-cfg-test-{}", std::process::id()));
        {
            let mut f = File::create(&dir).unwrap();
            writeln!(f, "port 7000").unwrap();
            writeln!(f, "# a comment").unwrap();
            writeln!(f, "bind 0.0.0.0").unwrap();
        }
        let cli = Cli {
            config: Some(dir.to_str().unwrap().to_string()),
            port: Some(9000),
            bind: None,
            replica_of: None,
            appendonly_path: None,
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn replicaof_parses_host_and_port() {
        let cli = Cli {
            config: None,
            port: None,
            bind: None,
            replica_of: Some("10.0.0.1:6380".to_string()),
            appendonly_path: None,
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.replica_of, Some(("10.0.0.1".to_string(), 6380)));
    }
}
