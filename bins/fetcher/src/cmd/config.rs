use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Args;
use serde::Deserialize;

use fetcher_api::{ClientConfig, parse_hosts};
use fetcher_engine::SessionOptions;

use super::error::FetcherError;

pub const DEFAULT_CONFIG: &str = "fetcher.toml";
pub const DEFAULT_HOST: &str = "127.0.0.1:6570";
pub const DEFAULT_INTERVAL_SECS: i64 = 3;
pub const DEFAULT_ACK_TIMEOUT_SECS: u32 = 60;
pub const DEFAULT_WAIT_SECS: u64 = 60;
pub const MEMORY_CLIENT: &str = "memory";

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub verbose: Option<bool>,
    pub interval: Option<i64>,
    pub stream_name: Option<String>,
    pub subscription_id: Option<String>,
    pub consumer_name: Option<String>,
    pub ack_timeout: Option<u32>,
    pub wait: Option<u64>,
    /// `"memory"` or a path to a client plugin library.
    pub client: Option<String>,
    pub client_config: Option<toml::Value>,
}

pub fn load_config(path: &Path) -> Result<Config, FetcherError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FetcherError::Config(format!("cannot read config {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| FetcherError::Config(format!("bad config {}: {e}", path.display())))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct FetchArgs {
    /// Path to the TOML config [default: fetcher.toml]
    #[arg(long, env = "FETCHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated broker addresses [default: 127.0.0.1:6570]
    #[arg(short = 'p', long)]
    pub host: Option<String>,

    /// Log every received record (`--verbose=false` turns off a config file's `verbose`)
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub verbose: Option<bool>,

    /// Seconds between progress reports, <= 0 disables them [default: 3]
    #[arg(short, long, allow_negative_numbers = true)]
    pub interval: Option<i64>,

    /// Stream to consume
    #[arg(short = 'n', long)]
    pub stream_name: Option<String>,

    /// Id of the subscription created for this run
    #[arg(short, long)]
    pub subscription_id: Option<String>,

    /// Consumer name [default: consumer_<unix nanos>]
    #[arg(short, long)]
    pub consumer_name: Option<String>,

    /// Ack timeout of the subscription, in seconds [default: 60]
    #[arg(short = 't', long)]
    pub ack_timeout: Option<u32>,

    /// Stop after this many seconds without deliveries [default: 60]
    #[arg(short, long)]
    pub wait: Option<u64>,

    /// Messaging client: "memory" or a path to a client plugin
    #[arg(long, env = "FETCHER_CLIENT")]
    pub client: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSource {
    Memory,
    Plugin(PathBuf),
}

/// Final configuration: defaults < config file < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub hosts: Vec<String>,
    pub verbose: bool,
    /// `None` when periodic reporting is disabled.
    pub interval: Option<Duration>,
    pub stream_name: String,
    pub subscription_id: String,
    pub consumer_name: String,
    pub ack_timeout_secs: u32,
    pub wait: Duration,
    pub client: ClientSource,
    pub client_options: serde_json::Map<String, serde_json::Value>,
}

impl Effective {
    pub fn new(args: &FetchArgs) -> Result<Self, FetcherError> {
        let cfg = match &args.config {
            Some(path) => load_config(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG);
                if path.exists() { load_config(path)? } else { Config::default() }
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &FetchArgs, cfg: Config) -> Result<Self, FetcherError> {
        let host = args.host.clone().or(cfg.host).unwrap_or_else(|| DEFAULT_HOST.into());
        let hosts = parse_hosts(&host);
        if hosts.is_empty() {
            return Err(FetcherError::Config("at least one host address is required (--host)".into()));
        }

        let stream_name = required(args.stream_name.clone().or(cfg.stream_name), "stream name", "--stream-name")?;
        let subscription_id =
            required(args.subscription_id.clone().or(cfg.subscription_id), "subscription id", "--subscription-id")?;

        let interval = args.interval.or(cfg.interval).unwrap_or(DEFAULT_INTERVAL_SECS);
        let interval = u64::try_from(interval)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let client = match args.client.clone().or(cfg.client).as_deref() {
            None | Some(MEMORY_CLIENT) => ClientSource::Memory,
            Some(path) => ClientSource::Plugin(PathBuf::from(path)),
        };

        Ok(Self {
            hosts,
            verbose: args.verbose.or(cfg.verbose).unwrap_or(false),
            interval,
            stream_name,
            subscription_id,
            consumer_name: args
                .consumer_name
                .clone()
                .or(cfg.consumer_name)
                .unwrap_or_else(default_consumer_name),
            ack_timeout_secs: args.ack_timeout.or(cfg.ack_timeout).unwrap_or(DEFAULT_ACK_TIMEOUT_SECS),
            wait: Duration::from_secs(args.wait.or(cfg.wait).unwrap_or(DEFAULT_WAIT_SECS)),
            client,
            client_options: client_options(cfg.client_config)?,
        })
    }

    /// Config handed to the messaging client; hosts always come from `host`.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.hosts.clone());
        config.options = self.client_options.clone();
        config
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            stream_name: self.stream_name.clone(),
            subscription_id: self.subscription_id.clone(),
            consumer_name: self.consumer_name.clone(),
            ack_timeout_secs: self.ack_timeout_secs,
            wait: self.wait,
            report_interval: self.interval,
            verbose: self.verbose,
        }
    }
}

fn required(value: Option<String>, what: &str, flag: &str) -> Result<String, FetcherError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(FetcherError::Config(format!("{what} is required ({flag})"))),
    }
}

fn default_consumer_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("consumer_{nanos}")
}

fn client_options(
    value: Option<toml::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>, FetcherError> {
    let Some(value) = value else {
        return Ok(serde_json::Map::new());
    };
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(mut map)) => {
            if map.remove("hosts").is_some() {
                tracing::warn!("client_config.hosts is ignored, use host instead");
            }
            Ok(map)
        }
        Ok(_) => Err(FetcherError::Config("client_config must be a table".into())),
        Err(e) => Err(FetcherError::Config(format!("client_config: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: FetchArgs,
    }

    fn args(argv: &[&str]) -> FetchArgs {
        let mut full = vec!["fetcher"];
        full.extend_from_slice(argv);
        TestCli::parse_from(full).args
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_apply_without_config() {
        let eff = Effective::merge(&args(&["-n", "quotes", "-s", "sub"]), Config::default()).unwrap();

        assert_eq!(eff.hosts, vec![DEFAULT_HOST.to_string()]);
        assert_eq!(eff.interval, Some(Duration::from_secs(3)));
        assert_eq!(eff.ack_timeout_secs, 60);
        assert_eq!(eff.wait, Duration::from_secs(60));
        assert!(!eff.verbose);
        assert_eq!(eff.client, ClientSource::Memory);
        assert!(eff.consumer_name.starts_with("consumer_"));
        assert!(eff.consumer_name["consumer_".len()..].parse::<u128>().is_ok());
    }

    #[test]
    fn stream_and_subscription_are_required() {
        let err = Effective::merge(&args(&["-s", "sub"]), Config::default()).unwrap_err();
        assert!(err.to_string().contains("--stream-name"));

        let err = Effective::merge(&args(&["-n", "quotes", "-s", " "]), Config::default()).unwrap_err();
        assert!(err.to_string().contains("--subscription-id"));
    }

    #[test]
    fn non_positive_interval_disables_reporting() {
        let eff = Effective::merge(&args(&["-n", "q", "-s", "s", "-i", "0"]), Config::default()).unwrap();
        assert_eq!(eff.interval, None);

        let eff = Effective::merge(&args(&["-n", "q", "-s", "s", "-i", "-5"]), Config::default()).unwrap();
        assert_eq!(eff.interval, None);
    }

    #[test]
    fn hosts_are_split_and_must_not_be_empty() {
        let eff = Effective::merge(
            &args(&["-n", "q", "-s", "s", "-p", "10.0.0.1:6570, 10.0.0.2:6570"]),
            Config::default(),
        )
        .unwrap();
        assert_eq!(eff.hosts, vec!["10.0.0.1:6570", "10.0.0.2:6570"]);

        assert!(Effective::merge(&args(&["-n", "q", "-s", "s", "-p", " , "]), Config::default()).is_err());
    }

    #[test]
    fn cli_overrides_config_file() {
        let file = write_config(
            r#"
host = "broker:6570"
stream_name = "from-file"
subscription_id = "file-sub"
wait = 10
interval = 7
verbose = true
client = "/opt/fetcher/libclient_hstream.so"

[client_config]
hosts = ["ignored"]
tls = false
"#,
        );
        let path = file.path().to_str().unwrap();
        let eff = Effective::new(&args(&["--config", path, "-n", "from-cli", "-w", "2"])).unwrap();

        assert_eq!(eff.hosts, vec!["broker:6570"]);
        assert_eq!(eff.stream_name, "from-cli");
        assert_eq!(eff.subscription_id, "file-sub");
        assert_eq!(eff.wait, Duration::from_secs(2));
        assert_eq!(eff.interval, Some(Duration::from_secs(7)));
        assert!(eff.verbose);
        assert_eq!(
            eff.client,
            ClientSource::Plugin(PathBuf::from("/opt/fetcher/libclient_hstream.so"))
        );

        let client_config = eff.client_config();
        assert_eq!(client_config.hosts, vec!["broker:6570"]);
        assert_eq!(client_config.options.get("tls"), Some(&serde_json::json!(false)));
        assert!(!client_config.options.contains_key("hosts"));
    }

    #[test]
    fn cli_can_turn_verbose_on_and_off() {
        let file = write_config("stream_name = \"q\"\nsubscription_id = \"s\"\nverbose = true\n");
        let path = file.path().to_str().unwrap();

        assert!(Effective::new(&args(&["--config", path])).unwrap().verbose);
        assert!(!Effective::new(&args(&["--config", path, "--verbose=false"])).unwrap().verbose);

        let quiet = write_config("stream_name = \"q\"\nsubscription_id = \"s\"\nverbose = false\n");
        let path = quiet.path().to_str().unwrap();
        assert!(Effective::new(&args(&["--config", path, "-v"])).unwrap().verbose);
        assert!(Effective::new(&args(&["-v", "--config", path])).unwrap().verbose);
        assert!(!Effective::new(&args(&["--config", path])).unwrap().verbose);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Effective::new(&args(&["--config", missing.to_str().unwrap(), "-n", "q", "-s", "s"]))
            .unwrap_err();
        assert!(err.to_string().contains("cannot read config"));
    }

    #[test]
    fn invalid_config_is_an_error() {
        let file = write_config("wait = \"soon\"\n");
        let path = file.path().to_str().unwrap();
        let err = Effective::new(&args(&["--config", path, "-n", "q", "-s", "s"])).unwrap_err();
        assert!(err.to_string().contains("bad config"));

        let file = write_config("client_config = 3\n");
        let path = file.path().to_str().unwrap();
        let err = Effective::new(&args(&["--config", path, "-n", "q", "-s", "s"])).unwrap_err();
        assert!(err.to_string().contains("client_config must be a table"));
    }

    #[test]
    fn session_options_mirror_effective_config() {
        let eff = Effective::merge(
            &args(&["-n", "q", "-s", "s", "-c", "me", "-t", "15", "-v"]),
            Config::default(),
        )
        .unwrap();
        let opts = eff.session_options();
        assert_eq!(opts.consumer_name, "me");
        assert_eq!(opts.ack_timeout_secs, 15);
        assert!(opts.verbose);
        assert_eq!(opts.report_interval, Some(Duration::from_secs(3)));
    }
}
