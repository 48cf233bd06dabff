/// Rewrites canonical origin URLs to a mirror host.
pub trait MirrorSelector: Send + Sync {
    fn rewrite(&self, url: &str) -> String;
}

/// Identity strategy: always the official origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMirror;

impl MirrorSelector for NoMirror {
    fn rewrite(&self, url: &str) -> String {
        url.to_string()
    }
}

const BMCLAPI: &str = "https://bmclapi2.bangbang93.com";

/// Longest-prefix origin → mirror replacement over a fixed table.
#[derive(Debug, Clone)]
pub struct PrefixMirror {
    /// Sorted by prefix length, longest first.
    mappings: Vec<(String, String)>,
}

impl PrefixMirror {
    pub fn new<I, O, M>(mappings: I) -> Self
    where
        I: IntoIterator<Item = (O, M)>,
        O: Into<String>,
        M: Into<String>,
    {
        let mut mappings: Vec<(String, String)> = mappings
            .into_iter()
            .map(|(origin, mirror)| (origin.into(), mirror.into()))
            .collect();
        mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { mappings }
    }

    /// The public BMCLAPI mirror.
    pub fn bmclapi() -> Self {
        let maven = format!("{BMCLAPI}/maven");
        Self::new([
            ("https://launchermeta.mojang.com", BMCLAPI.to_string()),
            ("https://launcher.mojang.com", BMCLAPI.to_string()),
            ("https://piston-meta.mojang.com", BMCLAPI.to_string()),
            ("https://piston-data.mojang.com", BMCLAPI.to_string()),
            (
                "https://resources.download.minecraft.net",
                format!("{BMCLAPI}/assets"),
            ),
            ("https://libraries.minecraft.net", maven.clone()),
            ("https://maven.minecraftforge.net", maven.clone()),
            ("https://files.minecraftforge.net/maven", maven.clone()),
            ("https://maven.neoforged.net/releases", maven.clone()),
            ("https://maven.fabricmc.net", maven),
            ("https://meta.fabricmc.net", format!("{BMCLAPI}/fabric-meta")),
        ])
    }
}

impl MirrorSelector for PrefixMirror {
    fn rewrite(&self, url: &str) -> String {
        for (origin, mirror) in &self.mappings {
            if let Some(rest) = url.strip_prefix(origin.as_str()) {
                return format!("{mirror}{rest}");
            }
        }
        url.to_string()
    }
}
