//! End-to-end scenarios.

use crate::helpers::{signed_intent, start_stack, wait_for_status, ETH, NOW};
use relay_admission::AdmissionError;
use relay_chain::{ChainAdapter, ChainError};
use relay_store::{keys, KvStore};
use shared_crypto::RelayerKeyPair;
use shared_types::{JobStatus, RejectReason, U256, WalletState};

fn eth(tenths: u64) -> U256 {
    U256::from(tenths) * U256::from(ETH / 10)
}

#[tokio::test]
async fn test_happy_path_confirms_and_settles_the_debit() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let quarter = U256::from(ETH / 4);
    let intent = signed_intent(&user, &client, quarter, "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();

    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;

    // Final balance 1.0 − 0.25 ETH
    assert_eq!(
        stack.relayer.get_prepaid_balance(&client).await.unwrap(),
        eth(10) - quarter
    );

    // One wallet advanced its nonce by one
    let wallets = stack.relayer.list_wallets().await;
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].local_nonce, 1);
    assert_eq!(wallets[0].successful_submissions, 1);

    // The status record carries the chain artifacts
    let record = stack.relayer.get_job_status(&job_id).await.unwrap().unwrap();
    assert!(record.tx_hash.is_some());
    assert!(record.block_number.is_some());

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_replay_of_an_admitted_intent_is_rejected() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(1), "n-1", NOW);

    let job_id = stack.relayer.submit_intent(intent.clone()).await.unwrap();
    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;
    let balance_after_first = stack.relayer.get_prepaid_balance(&client).await.unwrap();

    // The identical intent again: rejected, no ledger change
    let result = stack.relayer.submit_intent(intent).await;
    match result {
        Err(AdmissionError::Rejected(RejectReason::Replay { .. })) => {}
        other => panic!("expected replay reject, got {other:?}"),
    }
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), balance_after_first);

    let queue_status = stack.relayer.get_queue_status().await.unwrap();
    assert_eq!(queue_status.queued_by_priority.iter().map(|(_, n)| n).sum::<u64>(), 0);

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_insufficient_prepaid_rejects_without_side_effects() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(1)).await.unwrap();
    let intent = signed_intent(&user, &client, U256::from(ETH / 4), "n-1", NOW);

    let result = stack.relayer.submit_intent(intent).await;
    match result {
        Err(AdmissionError::Rejected(RejectReason::InsufficientPrepaid)) => {}
        other => panic!("expected insufficient_prepaid, got {other:?}"),
    }

    // Balance untouched and no replay record left behind
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), eth(1));
    assert!(stack
        .store
        .get(&keys::nonce_seen(&user.address(), "n-1"))
        .await
        .unwrap()
        .is_none());

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_transient_error_retries_then_confirms() {
    let stack = start_stack(1).await;
    stack.chain.queue_send_error(ChainError::Network("first submit drops".into()));
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(1), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();

    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;

    // The retry consumed one attempt and the debit applied exactly once
    let record = stack.relayer.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.attempt, 1);
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), eth(10) - eth(1));
    assert_eq!(stack.chain.sent_count(), 1);

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_permanent_failure_rolls_the_debit_back() {
    let stack = start_stack(1).await;
    stack.chain.queue_confirm_error(ChainError::Reverted);
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(2), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();

    wait_for_status(&stack, &job_id, JobStatus::RolledBack).await;

    // Fully re-credited, rollback point consumed
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), eth(10));
    assert!(stack.store.get(&keys::rollback(&job_id)).await.unwrap().is_none());
    assert_eq!(stack.audit.events_of_kind("rollback_applied").len(), 1);

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_nonce_divergence_drains_and_resyncs_the_wallet() {
    let stack = start_stack(2).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();
    stack.relayer.credit_prepaid(&client, eth(50)).await.unwrap();

    // A clean first payment
    let first = signed_intent(&user, &client, eth(1), "n-1", NOW);
    let first_id = stack.relayer.submit_intent(first).await.unwrap();
    wait_for_status(&stack, &first_id, JobStatus::Confirmed).await;

    // The next submission hits a nonce error; the job must retry and
    // still confirm (on a re-synced or different wallet)
    stack.chain.queue_send_error(ChainError::NonceTooLow);
    let second = signed_intent(&user, &client, eth(1), "n-2", NOW);
    let second_id = stack.relayer.submit_intent(second).await.unwrap();
    wait_for_status(&stack, &second_id, JobStatus::Confirmed).await;

    // Every wallet has settled back to idle with a chain-consistent nonce
    for _ in 0..100 {
        let wallets = stack.relayer.list_wallets().await;
        if wallets.iter().all(|w| w.state == WalletState::Idle) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    for wallet in stack.relayer.list_wallets().await {
        assert_eq!(wallet.state, WalletState::Idle);
        let chain_nonce = stack.chain.get_nonce(wallet.address).await.unwrap();
        assert_eq!(wallet.local_nonce, chain_nonce);
    }

    // The drain transition left an audit record
    assert!(!stack.audit.events_of_kind("wallet_draining").is_empty());

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_operator_wallet_actions_are_audited() {
    let stack = start_stack(1).await;
    let wallet = stack.wallet_addresses[0];

    stack.relayer.disable_wallet(wallet, "maintenance").await.unwrap();
    let wallets = stack.relayer.list_wallets().await;
    assert_eq!(wallets[0].state, WalletState::Disabled);

    stack.relayer.enable_wallet(wallet).await.unwrap();
    let wallets = stack.relayer.list_wallets().await;
    assert_eq!(wallets[0].state, WalletState::Idle);

    let disabled = stack.audit.events_of_kind("wallet_disabled");
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].subject, wallet.to_hex());
    assert_eq!(stack.audit.events_of_kind("wallet_enabled").len(), 1);

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_replay_record_survives_restart() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(1), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent.clone()).await.unwrap();
    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;
    stack.relayer.shutdown().await;

    // A second relayer over the same store still rejects the replay
    let revived = crate::helpers::restart_stack(&stack).await;
    let result = revived.submit_intent(intent).await;
    assert!(matches!(
        result,
        Err(AdmissionError::Rejected(RejectReason::Replay { .. }))
    ));
    revived.shutdown().await;
}

#[tokio::test]
async fn test_credit_exactly_covering_admit_leaves_zero() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(3)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(3), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();

    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), U256::zero());
    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_force_rollback_gated_to_failed_jobs() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(1), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();
    wait_for_status(&stack, &job_id, JobStatus::Confirmed).await;

    // Confirmed jobs are not eligible
    let refused = stack.relayer.force_rollback(&job_id).await.unwrap();
    assert!(matches!(refused, relay_node::ForceRollback::NotApplicable { .. }));
    // And the balance stayed debited
    assert_eq!(stack.relayer.get_prepaid_balance(&client).await.unwrap(), eth(10) - eth(1));

    stack.relayer.shutdown().await;
}

#[tokio::test]
async fn test_status_stream_delivers_transitions() {
    let stack = start_stack(1).await;
    let user = RelayerKeyPair::generate();
    let client = "client-a".to_string();

    stack.relayer.credit_prepaid(&client, eth(10)).await.unwrap();
    let intent = signed_intent(&user, &client, eth(1), "n-1", NOW);
    let job_id = stack.relayer.submit_intent(intent).await.unwrap();
    let mut stream = stack.relayer.subscribe_status(job_id);

    // The stream ends in the terminal record
    let mut last = None;
    while let Ok(record) =
        tokio::time::timeout(std::time::Duration::from_secs(3), stream.recv()).await
    {
        let record = record.expect("stream closed");
        let terminal = record.status.is_terminal();
        last = Some(record);
        if terminal {
            break;
        }
    }
    assert_eq!(last.expect("no records").status, JobStatus::Confirmed);

    stack.relayer.shutdown().await;
}
