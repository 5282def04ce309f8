use anyhow::{Context, Result};
use serde_json::json;
use sharkwatch::config::Config;
use sharkwatch::data::{log_store_loaded, RecordStore};
use sharkwatch::logging::{log, obj, v_str, Domain, Level};
use sharkwatch::server::{serve, AppState};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let path = Path::new(&cfg.data_path);

    // The table is read exactly once; a bad table stops start-up.
    let store = match RecordStore::load(path) {
        Ok(store) => store,
        Err(err) => {
            log(
                Level::Fatal,
                Domain::Data,
                "dataset_load_failed",
                obj(&[("path", v_str(&cfg.data_path)), ("error", v_str(&err.to_string()))]),
            );
            return Err(err).with_context(|| format!("loading {}", cfg.data_path));
        }
    };
    log_store_loaded(path, &store);

    let addr = cfg.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log(
        Level::Info,
        Domain::System,
        "listening",
        obj(&[
            ("addr", v_str(&addr)),
            (
                "endpoints",
                json!([
                    "GET /api/health",
                    "GET /api/options",
                    "GET /api/manifest",
                    "POST /api/dashboard",
                ]),
            ),
        ]),
    );

    let state = AppState {
        store,
        config: Arc::new(cfg),
    };
    serve(listener, state).await?;
    Ok(())
}
