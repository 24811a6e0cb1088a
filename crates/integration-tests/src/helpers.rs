//! Test stack assembly and intent builders.

use relay_chain::MockChain;
use relay_node::Relayer;
use relay_store::{MemoryAuditLog, MemoryStore};
use shared_crypto::{personal_message_hash, RelayerKeyPair};
use shared_types::{
    Address, JobId, JobStatus, MockTimeSource, PaymentIntent, Priority, RelayerConfig,
    TimeSource, U256,
};
use std::sync::Arc;
use std::time::Duration;

/// 1 ETH in wei.
pub const ETH: u64 = 1_000_000_000_000_000_000;

/// Base timestamp used by the frozen test clock.
pub const NOW: u64 = 1_700_000_000_000;

/// The API key every test client presents.
pub const API_KEY: &str = "integration-key";

/// The fully assembled relayer over in-memory adapters.
pub struct TestStack {
    pub relayer: Relayer,
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditLog>,
    pub clock: MockTimeSource,
    pub wallet_addresses: Vec<Address>,
    pub config: RelayerConfig,
}

/// Builds and starts a relayer with `wallet_count` funded wallets.
pub async fn start_stack(wallet_count: usize) -> TestStack {
    let mut config = RelayerConfig::default();
    config.admission.api_keys = vec![API_KEY.to_string()];
    config.queue.base_retry_delay_secs = 0;
    config.scheduler.max_concurrent = 2;
    config.scheduler.idle_poll_ms = 10;
    config.scheduler.shutdown_grace_secs = 2;
    config.wallet.balance_poll_interval_secs = 3_600;

    let chain = Arc::new(MockChain::new());
    let mut wallet_addresses = Vec::new();
    for _ in 0..wallet_count {
        let signer = RelayerKeyPair::generate();
        chain.set_balance(signer.address(), U256::from(100u64) * U256::from(ETH));
        wallet_addresses.push(signer.address());
        config.wallet.keys.push(hex::encode(signer.to_bytes()));
    }

    let clock = MockTimeSource::new(NOW);
    let time: Arc<dyn TimeSource> = Arc::new(clock.clone());
    let store = Arc::new(MemoryStore::with_time(time.clone()));
    let audit = Arc::new(MemoryAuditLog::new());

    let relayer = Relayer::new(
        config.clone(),
        store.clone(),
        chain.clone(),
        audit.clone(),
        time,
    )
    .await
    .expect("relayer construction");
    relayer.start().await.expect("relayer startup");

    TestStack { relayer, chain, store, audit, clock, wallet_addresses, config }
}

/// Builds and starts a fresh relayer over the same store, chain, and
/// clock, simulating a process restart.
pub async fn restart_stack(stack: &TestStack) -> Relayer {
    let time: Arc<dyn TimeSource> = Arc::new(stack.clock.clone());
    let relayer = Relayer::new(
        stack.config.clone(),
        stack.store.clone(),
        stack.chain.clone(),
        stack.audit.clone(),
        time,
    )
    .await
    .expect("relayer restart");
    relayer.start().await.expect("relayer restart startup");
    relayer
}

/// Builds an intent signed by `user` over the canonical message.
pub fn signed_intent(
    user: &RelayerKeyPair,
    client_id: &str,
    amount: U256,
    nonce: &str,
    timestamp: u64,
) -> PaymentIntent {
    let mut intent = PaymentIntent {
        from_address: user.address(),
        to_address: Address([0xBB; 20]),
        amount,
        nonce: nonce.to_string(),
        timestamp,
        signature: [0u8; 65],
        client_id: client_id.to_string(),
        api_key: API_KEY.to_string(),
        priority: Priority::Normal,
    };
    let digest = personal_message_hash(intent.canonical_message().as_bytes());
    intent.signature = user.sign_digest(&digest).expect("intent signing");
    intent
}

/// Polls until the job reaches `expected`, panicking after ~3 seconds.
pub async fn wait_for_status(stack: &TestStack, job_id: &JobId, expected: JobStatus) {
    for _ in 0..300 {
        if let Ok(Some(record)) = stack.relayer.get_job_status(job_id).await {
            if record.status == expected {
                return;
            }
            assert!(
                !(record.status.is_terminal() && record.status != expected),
                "job {job_id} terminated as {} while waiting for {expected}",
                record.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {expected}");
}
