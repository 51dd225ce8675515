mod app;
mod router;

use std::sync::Arc;

use eframe::{egui, NativeOptions};
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vault_core::{
    build_client, open_cache, spawn_synchronizer, ContentStore, HttpFetcher, StatePublisher,
    Synchronizer, VaultConfig,
};

use crate::app::{SiteApp, SiteInit};
use crate::router::Route;

fn main() -> eframe::Result<()> {
    init_tracing();

    let runtime = Arc::new(Runtime::new().expect("failed to initialise Tokio runtime"));
    let config = VaultConfig::load();
    let content = load_content(&config);
    let client = build_client(&config.fetch).expect("failed to build HTTP client");
    let cache = runtime.block_on(open_cache(&config.cache));

    // The one sync state of this session; everything else gets a handle to it.
    let publisher = StatePublisher::new();
    let updates = publisher.subscribe();

    let synchronizer = Synchronizer::new(
        cache,
        Arc::new(HttpFetcher::new(client, config.fetch.clone())),
        publisher.clone(),
        config.sync.clone(),
    )
    .with_namespace(config.cache.name.clone());

    let urls = content.all_asset_urls();
    info!(assets = urls.len(), "starting asset vault");
    let sync = {
        let guard = runtime.enter();
        let handle = spawn_synchronizer(synchronizer, urls);
        drop(guard);
        handle
    };

    let init = SiteInit {
        runtime,
        publisher,
        updates,
        sync,
        content,
        start: Route::initial(std::env::args().nth(1).as_deref()),
    };

    eframe::run_native(
        "VR Global",
        NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([960.0, 800.0])
                .with_min_inner_size([600.0, 500.0]),
            ..Default::default()
        },
        Box::new(move |_cc| Box::new(SiteApp::new(init))),
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_content(config: &VaultConfig) -> ContentStore {
    let loaded = match &config.content_file {
        Some(path) => ContentStore::from_file(path),
        None => ContentStore::builtin(),
    };
    loaded.unwrap_or_else(|e| {
        error!(error = %e, "failed to load site content, starting with no assets");
        ContentStore::default()
    })
}
