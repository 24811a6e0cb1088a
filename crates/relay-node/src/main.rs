//! Relayer node binary.
//!
//! Runs the core over the in-process adapters (in-memory store, mock
//! chain): the configuration, admission, queueing, wallet, and
//! lifecycle behavior are all real, which is what development and
//! integration environments need. A production deployment embeds
//! [`relay_node::Relayer`] behind its own chain adapter and store.

use relay_chain::MockChain;
use relay_node::{load_config, Relayer};
use relay_store::{MemoryStore, TracingAuditLog};
use shared_crypto::RelayerKeyPair;
use shared_types::{RelayerConfig, SystemTimeSource, U256};
use std::sync::Arc;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.scheduler.worker_threads)
        .enable_all()
        .build()
        .expect("tokio runtime");

    let exit = runtime.block_on(run(config));
    std::process::exit(exit);
}

async fn run(mut config: RelayerConfig) -> i32 {
    let chain = Arc::new(MockChain::new());

    // Dev stack: without configured keys, generate a wallet so the node
    // comes up ready to relay.
    if config.wallet.keys.is_empty() {
        let signer = RelayerKeyPair::generate();
        info!(wallet = %signer.address(), "no wallet keys configured, generated a dev wallet");
        config.wallet.keys = vec![hex::encode(signer.to_bytes())];
    }

    // The mock chain funds every configured wallet
    for key in &config.wallet.keys {
        if let Ok(signer) = RelayerKeyPair::from_hex(key) {
            chain.set_balance(signer.address(), U256::from(10u64).pow(U256::from(20u64)));
        }
    }

    let relayer = match Relayer::new(
        config,
        Arc::new(MemoryStore::new()),
        chain,
        Arc::new(TracingAuditLog),
        Arc::new(SystemTimeSource),
    )
    .await
    {
        Ok(relayer) => relayer,
        Err(e) => {
            error!(error = %e, "relayer construction failed");
            return 1;
        }
    };

    if let Err(e) = relayer.start().await {
        error!(error = %e, "relayer startup failed");
        return 1;
    }

    info!("relayer running, ctrl-c to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "signal listener failed");
    }

    relayer.shutdown().await;
    0
}
