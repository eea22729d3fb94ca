use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use threadboard::{
    api,
    config::Settings,
    service::CommentService,
    store::{CommentStore, MemoryStore, SqliteStore},
};

#[derive(Debug, Parser)]
#[command(name = "threadboard", version)]
struct Cli {
    /// Override HOST
    #[arg(long)]
    host: Option<String>,

    /// Override PORT
    #[arg(long)]
    port: Option<u16>,

    /// Override STORE_BACKEND (memory|sqlite)
    #[arg(long)]
    store: Option<String>,

    /// Override SQLITE_PATH
    #[arg(long)]
    sqlite_path: Option<String>,
}

fn open_store(settings: &Settings) -> Result<Arc<dyn CommentStore>> {
    match settings.store_backend.as_str() {
        "sqlite" => {
            let store = SqliteStore::new(&settings.sqlite_path)?;
            store.init_db()?;
            log::info!("store.open sqlite={}", store.path());
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(MemoryStore::new())),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(h) = cli.host {
        settings.host = h;
    }
    if let Some(p) = cli.port {
        settings.port = p;
    }
    if let Some(s) = cli.store {
        settings.store_backend = s.to_lowercase();
    }
    if let Some(p) = cli.sqlite_path {
        settings.sqlite_path = p;
    }
    settings.validate()?;

    let store = open_store(&settings)?;
    log::info!(
        "app.start store={} max_page_limit={}",
        store.kind(),
        settings.max_page_limit
    );

    let service = CommentService::new(store, settings.max_page_limit);
    api::serve(settings, service).await
}
