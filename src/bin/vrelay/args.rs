use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vacancy_relay::block::BlockConfig;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)))]
    pub(crate) listen: IpAddr,
    /// (TCP) port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub(crate) port: u16,
    /// SQLite database file, created if missing.
    #[arg(long, env = "DATABASE_PATH", default_value = "vacancy_relay.db")]
    pub(crate) database: PathBuf,
    /// Number of scraped vacancies after which scraping is done.
    #[arg(short, long, default_value_t = 300,
          value_parser = clap::value_parser!(i64).range(1..))]
    pub(crate) target: i64,
    /// Seconds between probes while blocked.
    #[arg(long, default_value_t = 60)]
    pub(crate) retry_interval_secs: u64,
    /// Milliseconds between test monitor polls while blocked.
    #[arg(long, default_value_t = 2000)]
    pub(crate) monitor_interval_ms: u64,
    /// Webhook receiving `{"text": ...}` block notifications.
    #[arg(long, env = "NOTIFY_URL")]
    pub(crate) notify_url: Option<String>,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}

impl Args {
    pub(crate) fn block_config(&self) -> BlockConfig {
        BlockConfig {
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            monitor_interval: Duration::from_millis(
                self.monitor_interval_ms.max(1),
            ),
        }
    }
}
