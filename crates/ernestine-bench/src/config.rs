use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use ernestine_core::{config::StoreConfig, store::s3::S3Config};
use std::{env, path::PathBuf};

const S3_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const S3_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const S3_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

const DEFAULT_S3_REGION: &str = "us-east-1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    Memory,
    Filesystem,
    S3,
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// The driver to be used.
    #[clap(long, short, value_enum, default_value = "filesystem", env = "ERNESTINE_DRIVER")]
    pub driver: Driver,

    /// Path to the directory where the filesystem driver stores blobs.
    #[clap(long, env = "ERNESTINE_FILESYSTEM_PATH")]
    pub filesystem_path: Option<PathBuf>,

    /// Endpoint of the S3-compatible service. Defaults to AWS for the region.
    #[clap(long, env = "AWS_ENDPOINT_URL_S3")]
    pub s3_endpoint: Option<String>,

    /// Bucket used by the s3 driver.
    #[clap(long, env = "ERNESTINE_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[clap(long, default_value = DEFAULT_S3_REGION, env = "AWS_REGION")]
    pub s3_region: String,

    /// TOML file describing the store; replaces the driver flags.
    #[clap(long, env = "ERNESTINE_CONFIG")]
    pub config: Option<PathBuf>,
}

impl StoreArgs {
    pub fn store_config(&self) -> Result<StoreConfig> {
        if let Some(path) = &self.config {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()));
        }

        match self.driver {
            Driver::Memory => Ok(StoreConfig::Memory),
            Driver::Filesystem => {
                let path = self.filesystem_path.clone().ok_or_else(|| {
                    anyhow!("--filesystem-path is required for the filesystem driver")
                })?;
                Ok(StoreConfig::Filesystem { path })
            }
            Driver::S3 => {
                let bucket = self
                    .s3_bucket
                    .clone()
                    .ok_or_else(|| anyhow!("--s3-bucket is required for the s3 driver"))?;
                let config = parse_s3_config(
                    |name| env::var(name).ok(),
                    bucket,
                    self.s3_endpoint.clone(),
                    self.s3_region.clone(),
                )?;
                Ok(StoreConfig::S3(config))
            }
        }
    }
}

pub fn parse_s3_config(
    lookup: impl Fn(&str) -> Option<String>,
    bucket: String,
    endpoint: Option<String>,
    region: String,
) -> Result<S3Config> {
    Ok(S3Config {
        key: lookup(S3_ACCESS_KEY_ID)
            .ok_or_else(|| anyhow!("{} env var not supplied", S3_ACCESS_KEY_ID))?,
        secret: lookup(S3_SECRET_ACCESS_KEY)
            .ok_or_else(|| anyhow!("{} env var not supplied", S3_SECRET_ACCESS_KEY))?,
        token: lookup(S3_SESSION_TOKEN),
        endpoint: endpoint
            .unwrap_or_else(|| format!("https://s3.dualstack.{}.amazonaws.com", region)),
        region,
        bucket,
    })
}
