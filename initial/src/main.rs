use std::{env, io, sync::Arc};

use log::info;
use tokio::{net::TcpListener, signal};

use initial::{Emitter, EntryConfig, Intake};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .ok_or_else(|| io::Error::other("usage: initial <config.json>"))?;
    let cfg = EntryConfig::load(&path)?;

    let listener = TcpListener::bind(&cfg.listen).await?;
    info!("completion intake listening at {}", cfg.listen);

    let intake = Arc::new(Intake::new());
    let emitter = Emitter::new(&cfg)?;
    info!(
        "emitting {} byte frames to role {} every {} ms",
        cfg.frame_len, cfg.first_role, cfg.period_ms
    );

    tokio::select! {
        ret = node::serve::serve(listener, Arc::clone(&intake)) => {
            ret?;
        }
        _ = emitter.run() => {}
        _ = signal::ctrl_c() => {
            info!("received SIGTERM, draining in-flight emissions");
            emitter.shutdown().await;
        }
    }

    Ok(())
}
