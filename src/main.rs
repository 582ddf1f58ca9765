use std::path::Path;
use std::sync::Arc;

use coinwatch::config::Config;
use coinwatch::notice::NoticeKind;
use coinwatch::{Result, Session};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::builtin(),
    };

    let (session, mut notices) = Session::new(config);
    let session = Arc::new(session);

    // Stand-in for the toast collaborator.
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice.kind {
                NoticeKind::Success => println!("[ok] {}: {}", notice.title, notice.detail),
                NoticeKind::Error => eprintln!("[!!] {}: {}", notice.title, notice.detail),
            }
        }
    });

    let outcome = session.load_initial().await?;
    println!("Tracking {} assets", outcome.assets.len());
    for asset in &outcome.assets {
        match (&asset.error, asset.price) {
            (Some(err), _) => println!("  {:<6} unavailable: {}", asset.symbol, err),
            (None, Some(price)) => println!("  {:<6} {:>12.2} USD", asset.symbol, price),
            (None, None) => println!("  {:<6} no price yet", asset.symbol),
        }
    }

    session.connect();
    session.spawn_auto_refresh();

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    session.shutdown().await;
    Ok(())
}
