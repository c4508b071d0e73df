//! Ranges Command
//!
//! Local preview of the allow-list a `specific` selection would produce.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use warpgen_common::{IpRangeAggregator, RangesStats, ServiceCatalog, SiteMode};

use crate::output::{print_item, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RangesArgs {
    /// IP ranges JSON file (defaults to the bundled catalog)
    #[arg(long)]
    pub ip_ranges: Option<PathBuf>,

    /// Service keys
    #[arg(required = true)]
    pub keys: Vec<String>,
}

/// Allow-list preview
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangesPreview {
    pub allowed_ips: String,
    pub full_tunnel: bool,
    pub unsupported: Vec<String>,
    #[serde(flatten)]
    pub stats: RangesStats,
}

impl TableDisplay for RangesPreview {
    fn headers() -> Vec<&'static str> {
        vec!["Allowed IPs", "Services", "Ranges", "Unique", "Unsupported"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.allowed_ips.replace(", ", "\n"),
            self.stats.total_services.to_string(),
            self.stats.total_ranges.to_string(),
            self.stats.unique_ranges.to_string(),
            self.unsupported.join(", "),
        ]
    }
}

/// Aggregate `keys` against `catalog` the way the service does in specific mode
pub fn preview(catalog: &ServiceCatalog, keys: &[String]) -> RangesPreview {
    let aggregator = IpRangeAggregator::new(catalog);
    let aggregation = aggregator.aggregate(SiteMode::Specific, keys);
    RangesPreview {
        full_tunnel: aggregation.allowed_ips.is_full_tunnel(),
        allowed_ips: aggregation.allowed_ips.to_string(),
        unsupported: aggregation.unsupported,
        stats: aggregator.stats(keys),
    }
}

pub fn execute(args: RangesArgs, format: OutputFormat) -> Result<()> {
    let catalog = ServiceCatalog::load_or_bundled(args.ip_ranges.as_deref())?;
    let preview = preview(&catalog, &args.keys);

    if preview.full_tunnel && format != OutputFormat::Json {
        print_warning("No ranges for this selection; the tunnel would carry all traffic");
    }
    print_item(&preview, format);
    Ok(())
}
