//! Services Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::client::{ServiceListing, WarpgenClient};
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct ServicesArgs {
    /// Only list recently added services
    #[arg(long)]
    pub new: bool,
}

/// Service display wrapper for serialization
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDisplay {
    pub key: String,
    pub name: String,
    pub is_new: bool,
    pub has_ranges: bool,
}

impl From<ServiceListing> for ServiceDisplay {
    fn from(listing: ServiceListing) -> Self {
        Self {
            is_new: listing.info.is_new(),
            key: listing.info.key,
            name: listing.info.name,
            has_ranges: listing.has_ranges,
        }
    }
}

impl TableDisplay for ServiceDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Key", "Name", "New", "Ranges"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.name.clone(),
            if self.is_new { "yes" } else { "" }.to_string(),
            if self.has_ranges { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub async fn execute(args: ServicesArgs, client: &WarpgenClient, format: OutputFormat) -> Result<()> {
    let services: Vec<ServiceDisplay> = client
        .services(args.new)
        .await?
        .into_iter()
        .map(ServiceDisplay::from)
        .collect();
    print_list(&services, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgen_common::ServiceInfo;

    #[test]
    fn test_row() {
        let display = ServiceDisplay::from(ServiceListing {
            info: ServiceInfo {
                key: "chatgpt".into(),
                name: "ChatGPT".into(),
                icon: "robot".into(),
                icon_library: "fas".into(),
                kind: Some("new".into()),
            },
            has_ranges: false,
        });
        assert_eq!(display.row(), vec!["chatgpt", "ChatGPT", "yes", "no"]);
    }
}
