//! Concurrency invariants over the assembled stack.

use crate::helpers::{signed_intent, start_stack, ETH, NOW};
use relay_admission::AdmissionError;
use shared_crypto::RelayerKeyPair;
use shared_types::{JobStatus, RejectReason, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn eth(tenths: u64) -> U256 {
    U256::from(tenths) * U256::from(ETH / 10)
}

/// Waits until no job is queued or in flight.
async fn drain(stack: &crate::helpers::TestStack) {
    for _ in 0..500 {
        let status = stack.relayer.get_queue_status().await.unwrap();
        let queued: u64 = status.queued_by_priority.iter().map(|(_, n)| n).sum();
        if queued == 0 && status.in_flight == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("backlog never drained");
}

#[tokio::test]
async fn test_ledger_never_goes_negative_under_concurrent_admission() {
    let stack = Arc::new(start_stack(2).await);
    let client = "client-a".to_string();

    // Funds cover exactly 4 of the 10 concurrent submissions
    stack.relayer.credit_prepaid(&client, eth(4)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let stack = stack.clone();
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let user = RelayerKeyPair::generate();
            let intent = signed_intent(&user, &client, eth(1), &format!("n-{i}"), NOW);
            stack.relayer.submit_intent(intent).await
        }));
    }

    let mut admitted = 0;
    let mut short = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AdmissionError::Rejected(RejectReason::InsufficientPrepaid)) => short += 1,
            Err(other) => panic!("unexpected admission failure: {other:?}"),
        }
    }
    assert_eq!(admitted, 4);
    assert_eq!(short, 6);

    // Exactly the admitted reserves were debited
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), U256::zero());

    drain(stack.as_ref()).await;
    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_same_nonce_admits_at_most_once_concurrently() {
    let stack = Arc::new(start_stack(1).await);
    let client = "client-a".to_string();
    stack.relayer.credit_prepaid(&client, eth(50)).await.unwrap();

    let user = Arc::new(RelayerKeyPair::generate());
    let intent = signed_intent(&user, &client, eth(1), "shared-nonce", NOW);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let stack = stack.clone();
        let intent = intent.clone();
        tasks.push(tokio::spawn(async move { stack.relayer.submit_intent(intent).await }));
    }

    let mut admitted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AdmissionError::Rejected(RejectReason::Replay { .. })) => {}
            Err(other) => panic!("unexpected admission failure: {other:?}"),
        }
    }
    assert_eq!(admitted, 1);

    drain(stack.as_ref()).await;
    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_per_wallet_nonces_are_gapless_under_load() {
    let stack = Arc::new(start_stack(3).await);
    let client = "client-a".to_string();
    stack.relayer.credit_prepaid(&client, eth(500)).await.unwrap();

    let mut job_ids = Vec::new();
    for i in 0..12 {
        let user = RelayerKeyPair::generate();
        let intent = signed_intent(&user, &client, eth(1), &format!("n-{i}"), NOW);
        job_ids.push(stack.relayer.submit_intent(intent).await.unwrap());
    }

    drain(stack.as_ref()).await;
    for job_id in &job_ids {
        let record = stack.relayer.get_job_status(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Confirmed);
    }

    // Every accepted submission used a strictly increasing, gap-free
    // nonce sequence per wallet
    let mut by_wallet: HashMap<_, Vec<u64>> = HashMap::new();
    for tx in stack.chain.sent() {
        by_wallet.entry(tx.from).or_default().push(tx.tx.nonce);
    }
    assert_eq!(by_wallet.values().map(Vec::len).sum::<usize>(), 12);
    for nonces in by_wallet.values() {
        for (expected, nonce) in nonces.iter().enumerate() {
            assert_eq!(*nonce, expected as u64);
        }
    }

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_all_leases_return_after_the_storm() {
    let stack = Arc::new(start_stack(2).await);
    let client = "client-a".to_string();
    stack.relayer.credit_prepaid(&client, eth(200)).await.unwrap();

    for i in 0..8 {
        let user = RelayerKeyPair::generate();
        let intent = signed_intent(&user, &client, eth(1), &format!("n-{i}"), NOW);
        stack.relayer.submit_intent(intent).await.unwrap();
    }

    drain(stack.as_ref()).await;

    let wallets = stack.relayer.list_wallets().await;
    for wallet in &wallets {
        assert_eq!(wallet.pending_count, 0, "wallet {} kept a lease", wallet.address);
    }
    let stats = stack.relayer.wallet_stats().await;
    assert_eq!(stats.leased_wallets, 0);
    assert_eq!(stats.total_submissions, 8);

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_boot_sweep_settles_orphaned_debits() {
    use relay_store::{keys, KvStore};
    use shared_types::{JobId, RollbackPoint};

    let stack = start_stack(1).await;
    let client = "client-a".to_string();
    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();

    // Fake a crash between debit and enqueue: debit gone, rollback
    // point written, no job record
    let orphan = JobId::new_v4();
    let point = RollbackPoint { client_id: client.clone(), amount: eth(3), created_at: NOW };
    stack
        .store
        .set(&keys::rollback(&orphan), &serde_json::to_string(&point).unwrap(), None)
        .await
        .unwrap();
    stack.relayer.shutdown().await;

    // Restarting applies the compensating credit exactly once
    let revived = crate::helpers::restart_stack(&stack).await;
    assert_eq!(revived.get_prepaid_balance(&client).await.unwrap(), eth(13));
    revived.shutdown().await;
}
