// SPDX-License-Identifier: MIT

//! Device geometry from the GEOM configuration tree (`kern.geom.confxml`).

use std::collections::HashMap;

use crate::{
    error::{HostError, HostResult},
    host::Host,
    runner::HostOps,
};

/// Physical attributes of one GEOM provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGeometry {
    pub name: String,
    pub sector_size: u64,
    pub media_size: Option<u64>,
    pub stripe_size: Option<u64>,
}

/// Provider attributes as read from the document, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProviderEntry {
    sector_size: Option<u64>,
    media_size: Option<u64>,
    stripe_size: Option<u64>,
}

/// Every provider of the `kern.geom.confxml` document, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct GeomTree {
    providers: HashMap<String, ProviderEntry>,
}

impl GeomTree {
    pub fn parse(xml: &str) -> HostResult<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| HostError::Topology(e.to_string()))?;

        let mut providers = HashMap::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("provider")) {
            let Some(name) = child_text(&node, "name") else {
                continue;
            };
            // First definition wins.
            providers
                .entry(name.to_string())
                .or_insert_with(|| ProviderEntry {
                    sector_size: child_u64(&node, "sectorsize").filter(|&s| s > 0),
                    media_size: child_u64(&node, "mediasize"),
                    stripe_size: child_u64(&node, "stripesize"),
                });
        }

        Ok(Self { providers })
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Looks up the `<provider>` whose `<name>` is exactly `name`.
    pub fn provider(&self, name: &str) -> HostResult<DeviceGeometry> {
        let entry = self
            .providers
            .get(name)
            .ok_or_else(|| HostError::ProviderNotFound(name.to_string()))?;

        let sector_size = entry.sector_size.ok_or_else(|| HostError::ProviderAttribute {
            provider: name.to_string(),
            attribute: "sectorsize",
        })?;

        Ok(DeviceGeometry {
            name: name.to_string(),
            sector_size,
            media_size: entry.media_size,
            stripe_size: entry.stripe_size,
        })
    }
}

fn child_text<'a>(node: &roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .map(str::trim)
}

fn child_u64(node: &roxmltree::Node<'_, '_>, tag: &str) -> Option<u64> {
    child_text(node, tag)?.parse().ok()
}

impl<H: HostOps> Host<H> {
    /// Geometry of `device`, fetched from the topology once per process.
    pub fn geometry(&self, device: &str) -> HostResult<DeviceGeometry> {
        self.geometry
            .get_or_init(device, || self.topology()?.provider(device))
    }

    fn topology(&self) -> HostResult<&GeomTree> {
        self.topology
            .get_or_init(|| {
                let request = self.tools.geom_confxml_request();
                let output = self.ops.run(&request)?.check(&request.program)?;
                let xml = output.stdout_str(&request.program)?;
                // sysctl -b emits a trailing NUL.
                GeomTree::parse(xml.trim_end_matches(['\0', '\n']).trim())
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}
