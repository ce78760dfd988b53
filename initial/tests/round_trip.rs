use std::{collections::HashMap, sync::Arc, time::Duration};

use initial::{Emitter, EntryConfig, Intake};
use model::{ComputeUnit, UnitSpec};
use node::{
    NodeConfig, StageCoordinator,
    config::{Downstream, Dtype, InputSpec, PortMap},
};
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

struct Echo;

impl ComputeUnit for Echo {
    fn infer(&mut self, input: &[f32]) -> Vec<f32> {
        input.to_vec()
    }
}

async fn intake_server() -> (String, Arc<Intake>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let intake = Arc::new(Intake::new());
    tokio::spawn(node::serve::serve(listener, Arc::clone(&intake)));

    (addr, intake)
}

async fn stage_server(intake_addr: String) -> String {
    let mut addresses = HashMap::new();
    addresses.insert("initial".to_string(), vec![intake_addr]);

    let cfg = NodeConfig {
        role: "fc1".to_string(),
        listen: "127.0.0.1:0".to_string(),
        input: InputSpec {
            dtype: Dtype::U8,
            len: 8,
        },
        quorum: None,
        downstream: vec![Downstream {
            role: "initial".to_string(),
            copies: 1,
        }],
        unit: UnitSpec {
            in_len: 8,
            out_len: 8,
            seed: 0,
        },
        addresses,
        ports: PortMap::default(),
        forward_timeout_ms: None,
        acquire_timeout_ms: None,
    };

    let stage = Arc::new(StageCoordinator::new(&cfg, Box::new(|| Box::new(Echo))).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(node::serve::serve(listener, stage));

    addr
}

fn entry_config(stage_addr: String) -> EntryConfig {
    let mut addresses = HashMap::new();
    addresses.insert("fc1".to_string(), vec![stage_addr]);

    EntryConfig {
        first_role: "fc1".to_string(),
        listen: "127.0.0.1:0".to_string(),
        period_ms: 10,
        frame_len: 8,
        tag: "initial".to_string(),
        addresses,
        ports: PortMap::default(),
        forward_timeout_ms: None,
        acquire_timeout_ms: None,
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn frames_travel_the_loop_back_to_the_intake() {
    let (intake_addr, intake) = intake_server().await;
    let stage_addr = stage_server(intake_addr).await;

    let cfg = entry_config(stage_addr);
    cfg.validate().unwrap();
    let emitter = Emitter::new(&cfg).unwrap();

    // First frame sets the round-trip baseline.
    emitter.emit_one();
    wait_for(|| intake.stats().baseline_started()).await;
    assert_eq!(intake.stats().completions(), 0);

    // Later frames complete measured round trips.
    emitter.emit_one();
    emitter.emit_one();
    wait_for(|| intake.stats().completions() == 2).await;

    emitter.shutdown().await;
    let stats = emitter.latency().snapshot("fc1").unwrap();
    assert_eq!(stats.count(), 3);
}

#[tokio::test]
async fn emissions_survive_an_unreachable_stage() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap().to_string();
    drop(dead);

    let cfg = entry_config(dead_addr);
    let emitter = Emitter::new(&cfg).unwrap();

    // Failed forwards are logged and dropped; the address must come back
    // to the pool so the next emission can proceed.
    emitter.emit_one();
    emitter.emit_one();
    emitter.shutdown().await;

    assert!(emitter.latency().snapshot("fc1").is_none());
}
