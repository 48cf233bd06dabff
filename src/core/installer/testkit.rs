//! A fake Mojang/loader origin plus a ready-made install context.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::context::InstallContext;
use super::stage::tests::RecordingSink;
use super::stage::{ProgressSink, StageProgress};
use crate::core::config::EngineSettings;
use crate::core::dependency::{DependencyResolver, GameDirectory};
use crate::core::downloader::{ChunkedDownloader, DownloadOptions, GroupDownloader, NoMirror};
use crate::core::http::build_http_client;
use crate::core::test_support::{payload, sha1_hex, TestOrigin};

pub const GAME_VERSION: &str = "1.20.1";

pub struct Fixture {
    pub origin: TestOrigin,
    pub game: GameDirectory,
    pub settings: EngineSettings,
    pub cancel: CancellationToken,
    pub java: PathBuf,
    client: reqwest::Client,
    resolver: DependencyResolver,
    strict_resolver: DependencyResolver,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub async fn start() -> Self {
        let origin = TestOrigin::start().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings {
            chunk_size: 4096,
            max_retry_count: 1,
            version_manifest_url: origin.url("/mc/version_manifest_v2.json"),
            mojang_libraries_url: origin.url("/libraries"),
            resources_url: origin.url("/resources"),
            fabric_meta_url: origin.url("/fabric-meta/v2"),
            quilt_meta_url: origin.url("/quilt-meta/v3"),
            forge_maven_url: origin.url("/forge-maven"),
            neoforge_maven_url: origin.url("/neoforge-maven"),
            optifine_download_url: origin.url("/optifine/{mc}/{type}/{patch}"),
            ..EngineSettings::default()
        };
        let client = build_http_client(&settings).unwrap();
        let group = GroupDownloader::new(
            Arc::new(ChunkedDownloader::new(
                client.clone(),
                DownloadOptions::from(&settings),
            )),
            Arc::new(NoMirror),
        );
        Self {
            game: GameDirectory::new(dir.path()),
            resolver: DependencyResolver::new(group.clone(), 8, false),
            strict_resolver: DependencyResolver::new(group, 8, true),
            cancel: CancellationToken::new(),
            java: PathBuf::from("java"),
            origin,
            settings,
            client,
            _dir: dir,
        }
    }

    pub fn context(&self, sink: Arc<dyn ProgressSink>) -> InstallContext<'_> {
        self.context_with(sink, &self.resolver)
    }

    pub fn strict_context(&self, sink: Arc<dyn ProgressSink>) -> InstallContext<'_> {
        self.context_with(sink, &self.strict_resolver)
    }

    fn context_with<'a>(
        &'a self,
        sink: Arc<dyn ProgressSink>,
        resolver: &'a DependencyResolver,
    ) -> InstallContext<'a> {
        InstallContext {
            directory: &self.game,
            settings: &self.settings,
            client: &self.client,
            resolver,
            java: &self.java,
            sink,
            cancel: &self.cancel,
        }
    }

    /// Fire the fixture's cancel token shortly after `stage` of `scope`
    /// reports `Starting`.
    pub fn cancel_on_start(
        &self,
        sink: Arc<RecordingSink>,
        scope: &'static [&'static str],
        stage: &'static str,
    ) -> tokio::task::JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            while !sink.of(scope).contains(&(stage, StageProgress::Starting)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    }

    pub fn asset_bodies(&self) -> Vec<Vec<u8>> {
        vec![payload(700), payload(5_000)]
    }

    /// Manifest, version JSON, asset index, two assets, client jar and one
    /// library for [`GAME_VERSION`].
    pub fn serve_vanilla(&self) {
        let o = &self.origin;

        let mut objects = serde_json::Map::new();
        for (i, body) in self.asset_bodies().into_iter().enumerate() {
            let hash = sha1_hex(&body);
            objects.insert(
                format!("minecraft/sounds/{i}.ogg"),
                json!({"hash": hash, "size": body.len()}),
            );
            o.serve(&format!("/resources/{}/{}", &hash[..2], hash), body);
        }
        let index = serde_json::to_vec(&json!({ "objects": objects })).unwrap();
        let index_sha1 = sha1_hex(&index);
        let index_len = index.len();
        o.serve("/mc/indexes/5.json", index);

        let client = payload(20_000);
        let client_sha1 = sha1_hex(&client);
        let client_len = client.len();
        o.serve("/mc/client.jar", client);

        let lib = payload(1_234);
        let lib_path = "com/example/util/1.0/util-1.0.jar";
        let lib_sha1 = sha1_hex(&lib);
        o.serve(&format!("/libraries/{lib_path}"), lib);

        let version = json!({
            "id": GAME_VERSION,
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": {"id": "5", "sha1": index_sha1, "size": index_len, "url": o.url("/mc/indexes/5.json")},
            "downloads": {"client": {"sha1": client_sha1, "size": client_len, "url": o.url("/mc/client.jar")}},
            "libraries": [
                {"name": "com.example:util:1.0",
                 "downloads": {"artifact": {"path": lib_path, "sha1": lib_sha1, "size": 1_234, "url": o.url(&format!("/libraries/{lib_path}"))}}},
                {"name": "com.example:never:1.0",
                 "rules": [{"action": "allow", "os": {"name": "no-such-os"}}]}
            ]
        });
        o.serve(
            &format!("/mc/{GAME_VERSION}.json"),
            serde_json::to_vec(&version).unwrap(),
        );

        let manifest = json!({
            "latest": {"release": GAME_VERSION, "snapshot": GAME_VERSION},
            "versions": [
                {"id": GAME_VERSION, "type": "release", "url": o.url(&format!("/mc/{GAME_VERSION}.json"))}
            ]
        });
        o.serve(
            "/mc/version_manifest_v2.json",
            serde_json::to_vec(&manifest).unwrap(),
        );
    }
}
