use std::{env, io, sync::Arc};

use log::info;
use tokio::{net::TcpListener, signal};

use node::{NodeConfig, StageCoordinator, serve};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .ok_or_else(|| io::Error::other("usage: node <config.json>"))?;
    let cfg = NodeConfig::load(&path)?;

    let listener = TcpListener::bind(&cfg.listen).await?;
    info!("serving role {} at {}", cfg.role, cfg.listen);

    let spec = cfg.unit.clone();
    let stage = Arc::new(StageCoordinator::new(
        &cfg,
        Box::new(move || model::build(&spec)),
    )?);

    tokio::select! {
        ret = serve::serve(listener, Arc::clone(&stage)) => {
            ret?;
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM, draining in-flight forwards");
            stage.shutdown().await;
        }
    }

    Ok(())
}
