//! Keygen Command

use anyhow::Result;
use serde::Serialize;
use warpgen_common::KeyPair;

use crate::output::{print_item, OutputFormat, TableDisplay};

/// Key pair display wrapper
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairDisplay {
    pub private_key: String,
    pub public_key: String,
}

impl From<KeyPair> for KeyPairDisplay {
    fn from(keys: KeyPair) -> Self {
        Self {
            private_key: keys.private_key,
            public_key: keys.public_key,
        }
    }
}

impl TableDisplay for KeyPairDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Private Key", "Public Key"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.private_key.clone(), self.public_key.clone()]
    }
}

pub fn execute(format: OutputFormat) -> Result<()> {
    let keys = KeyPairDisplay::from(KeyPair::generate()?);
    print_item(&keys, format);
    Ok(())
}
