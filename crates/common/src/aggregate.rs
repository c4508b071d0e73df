//! Allow-list aggregation
//!
//! Resolves selected service keys to a single AllowedIPs value. The result is
//! never empty: whenever no usable range remains, the full-tunnel sentinel is
//! returned instead.

use crate::catalog::ServiceCatalog;
use crate::types::{AllowedIps, SiteMode};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Outcome of aggregating a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub allowed_ips: AllowedIps,
    /// Selected keys absent from the catalog, sorted and deduplicated
    pub unsupported: Vec<String>,
}

/// Range counts for a selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangesStats {
    pub total_services: usize,
    pub total_ranges: usize,
    pub unique_ranges: usize,
}

/// Check that an entry is an IPv4 or IPv6 CIDR with an explicit prefix
pub fn is_valid_cidr(entry: &str) -> bool {
    entry.contains('/') && entry.parse::<IpNetwork>().is_ok()
}

/// Resolves service keys against an injected catalog
#[derive(Debug, Clone, Copy)]
pub struct IpRangeAggregator<'a> {
    catalog: &'a ServiceCatalog,
}

impl<'a> IpRangeAggregator<'a> {
    pub fn new(catalog: &'a ServiceCatalog) -> Self {
        Self { catalog }
    }

    /// Valid CIDR entries for one service, in catalog order.
    ///
    /// Unknown keys yield an empty list; invalid entries are logged and
    /// skipped.
    pub fn ranges_for(&self, key: &str) -> Vec<String> {
        let Some(raw) = self.catalog.get(key) else {
            return Vec::new();
        };

        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter(|entry| {
                let ok = is_valid_cidr(entry);
                if !ok {
                    warn!("Skipping invalid range {:?} for service {}", entry, key);
                }
                ok
            })
            .map(str::to_string)
            .collect()
    }

    /// Compute the allow-list for a selection
    pub fn aggregate(&self, site_mode: SiteMode, keys: &[String]) -> Aggregation {
        let mut unsupported = BTreeSet::new();
        let mut union = BTreeSet::new();

        for key in keys {
            if !self.catalog.contains(key) {
                unsupported.insert(key.clone());
                continue;
            }
            union.extend(self.ranges_for(key));
        }

        let unsupported: Vec<String> = unsupported.into_iter().collect();
        if !unsupported.is_empty() {
            warn!("Unsupported services found: {}", unsupported.join(", "));
        }

        let allowed_ips = if site_mode == SiteMode::All || keys.is_empty() {
            AllowedIps::FullTunnel
        } else if union.is_empty() {
            warn!("No IP ranges found for selected services, defaulting to all traffic");
            AllowedIps::FullTunnel
        } else {
            AllowedIps::Ranges(union.into_iter().collect())
        };

        debug!(
            "Aggregated {} services into {} ranges (full tunnel: {})",
            keys.len(),
            allowed_ips.len(),
            allowed_ips.is_full_tunnel()
        );

        Aggregation {
            allowed_ips,
            unsupported,
        }
    }

    /// Range counts for a selection, before deduplication and after
    pub fn stats(&self, keys: &[String]) -> RangesStats {
        let mut total_ranges = 0;
        let mut unique = BTreeSet::new();

        for key in keys {
            let ranges = self.ranges_for(key);
            total_ranges += ranges.len();
            unique.extend(ranges);
        }

        RangesStats {
            total_services: keys.len(),
            total_ranges,
            unique_ranges: unique.len(),
        }
    }
}
