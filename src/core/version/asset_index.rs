use std::collections::HashMap;

use serde::Deserialize;

use crate::core::dependency::Dependency;

/// Asset index JSON (`assets/indexes/<id>.json`).
#[derive(Debug, Deserialize)]
pub struct AssetIndexDocument {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetIndexDocument {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// One `Asset` dependency per distinct object hash.
    pub fn dependencies(&self, resources_url: &str) -> Vec<Dependency> {
        let mut hashes: Vec<&AssetObject> = self.objects.values().collect();
        hashes.sort_by(|a, b| a.hash.cmp(&b.hash));
        hashes.dedup_by(|a, b| a.hash == b.hash);
        hashes
            .into_iter()
            .map(|obj| Dependency::Asset {
                hash: obj.hash.to_ascii_lowercase(),
                size: obj.size,
                resources_url: resources_url.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_objects_collapse_to_one_download() {
        let doc = AssetIndexDocument::parse(
            r#"{"objects": {
                "icons/icon_16x16.png": {"hash": "bdf48ef6b5d0d23bbb02e17d04865216179f510a", "size": 3665},
                "minecraft/icons/icon_16x16.png": {"hash": "bdf48ef6b5d0d23bbb02e17d04865216179f510a", "size": 3665},
                "pack.mcmeta": {"hash": "4f8e5c8e1e37f4dcfe1d2fd8bb6c0e8ffc2f7b57", "size": 104}
            }}"#,
        )
        .unwrap();
        let deps = doc.dependencies("https://resources.download.minecraft.net");
        assert_eq!(deps.len(), 2);
        assert_eq!(
            deps[1].url(),
            "https://resources.download.minecraft.net/bd/bdf48ef6b5d0d23bbb02e17d04865216179f510a"
        );
    }
}
