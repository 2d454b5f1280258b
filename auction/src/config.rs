use {
    anyhow::Result,
    clap::{
        crate_authors,
        crate_description,
        crate_name,
        crate_version,
        Args,
        Parser,
    },
    live_auction_api_types::{
        Amount,
        LotId,
    },
    std::{
        collections::HashSet,
        fs,
        time::Duration,
    },
};

pub mod server;

#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
pub enum Options {
    /// Run the live auction server.
    Run(RunOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Server Options
    #[command(flatten)]
    pub server: server::Options,

    #[command(flatten)]
    pub config: ConfigOptions,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Config Options")]
#[group(id = "Config")]
pub struct ConfigOptions {
    /// Path to a configuration file containing the lot catalog.
    #[arg(long = "config")]
    #[arg(env = "AUCTION_CONFIG")]
    #[arg(default_value = "config.yaml")]
    pub config: String,
}

/// The lot catalog. Fixed for the lifetime of the process; a reset
/// reinitializes the bidding state of these lots but never changes the
/// catalog itself.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub lots: Vec<LotConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let yaml_content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&yaml_content)?;
        let mut seen = HashSet::new();
        for lot in &config.lots {
            if !seen.insert(&lot.id) {
                anyhow::bail!("Duplicate lot id in catalog: {}", lot.id);
            }
        }
        Ok(config)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LotConfig {
    pub id:             LotId,
    pub title:          String,
    /// The bid floor. Bidding starts here and returns here on reset.
    pub starting_price: Amount,
    /// How long bidding stays open, measured from startup and from each
    /// reset. Human-readable, e.g. "10m".
    #[serde(with = "humantime_serde")]
    pub duration:       Duration,
}
