//! WireGuard config rendering
//!
//! Pure and deterministic: equal [`ConfigParams`] always produce byte-identical
//! output. Both renderings are built from the same list of directives, so they
//! differ only in layout (comments and blank lines), never in values.

use crate::profile::{DeviceProfile, DeviceProfiles};
use crate::types::{ConfigParams, RenderedConfig};
use crate::{Error, Result};
use std::fmt::Write;

/// Renders [`ConfigParams`] into file and QR text
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    profiles: DeviceProfiles,
}

/// A section of the config, as ordered `Key = Value` lines
struct Section<'a> {
    name: &'static str,
    lines: Vec<(&'a str, &'a str)>,
}

impl ConfigRenderer {
    pub fn new(profiles: DeviceProfiles) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &DeviceProfiles {
        &self.profiles
    }

    /// Render both forms
    pub fn render(&self, params: &ConfigParams) -> Result<RenderedConfig> {
        let profile = self.profiles.get(params.device_type).ok_or_else(|| {
            Error::InvalidConfig(format!("no profile for device type {}", params.device_type))
        })?;

        let address = format_address(&params.client_ipv4, &params.client_ipv6);
        let allowed_ips = params.allowed_ips.to_string();

        // Provider-supplied values
        for (field, value) in [
            ("Address", address.as_str()),
            ("PublicKey", params.peer_public_key.as_str()),
        ] {
            if has_line_break(value) {
                return Err(Error::Protocol(format!(
                    "provider {} contains a line break",
                    field
                )));
            }
        }
        for (field, value) in [
            ("PrivateKey", params.private_key.as_str()),
            ("Endpoint", params.endpoint.as_str()),
        ] {
            if has_line_break(value) {
                return Err(Error::Internal(format!("{} contains a line break", field)));
            }
        }

        let sections = build_sections(params, profile, &address, &allowed_ips);

        Ok(RenderedConfig {
            file_text: render_file(params, profile, &sections),
            qr_text: render_compact(&sections),
        })
    }
}

fn build_sections<'a>(
    params: &'a ConfigParams,
    profile: &'a DeviceProfile,
    address: &'a str,
    allowed_ips: &'a str,
) -> [Section<'a>; 2] {
    let mut interface = vec![
        ("PrivateKey", params.private_key.as_str()),
        ("Address", address),
        ("DNS", profile.dns.as_str()),
    ];
    interface.extend(
        profile
            .interface
            .iter()
            .map(|d| (d.key.as_str(), d.value.as_str())),
    );

    let mut peer = vec![
        ("PublicKey", params.peer_public_key.as_str()),
        ("AllowedIPs", allowed_ips),
        ("Endpoint", params.endpoint.as_str()),
    ];
    peer.extend(
        profile
            .peer
            .iter()
            .map(|d| (d.key.as_str(), d.value.as_str())),
    );

    [
        Section {
            name: "Interface",
            lines: interface,
        },
        Section {
            name: "Peer",
            lines: peer,
        },
    ]
}

fn render_file(params: &ConfigParams, profile: &DeviceProfile, sections: &[Section<'_>]) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "# WARP configuration (profile: {})", params.device_type);
    if !profile.description.is_empty() {
        let _ = writeln!(out, "# {}", profile.description);
    }

    for section in sections {
        out.push('\n');
        let _ = writeln!(out, "[{}]", section.name);
        for (key, value) in &section.lines {
            let _ = writeln!(out, "{} = {}", key, value);
        }
    }

    out
}

fn render_compact(sections: &[Section<'_>]) -> String {
    let mut out = String::new();
    for section in sections {
        let _ = writeln!(out, "[{}]", section.name);
        for (key, value) in &section.lines {
            let _ = writeln!(out, "{} = {}", key, value);
        }
    }
    out
}

fn has_line_break(value: &str) -> bool {
    value.contains('\n') || value.contains('\r')
}

/// `v4/32, v6/128`, keeping any prefix the provider already supplied
fn format_address(ipv4: &str, ipv6: &str) -> String {
    let with_prefix = |addr: &str, bits: u8| {
        let addr = addr.trim();
        if addr.contains('/') {
            addr.to_string()
        } else {
            format!("{}/{}", addr, bits)
        }
    };
    format!("{}, {}", with_prefix(ipv4, 32), with_prefix(ipv6, 128))
}
