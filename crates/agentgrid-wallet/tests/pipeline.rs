mod common;

use std::sync::Arc;
use std::time::Duration;

use agentgrid_crypto::recover_signer;
use agentgrid_types::{AgentId, Amount, TokenId, TransactionRequest, WalletError};
use common::{addr, init_tracing, limits, test_config, Harness, ImpostorClaims, StalledClaims};

fn native(agent: &str, recipient: u8, amount: u128) -> TransactionRequest {
    TransactionRequest::native(AgentId::new(agent), addr(recipient), Amount(amount))
}

#[tokio::test]
async fn test_execute_signs_submits_and_records_spend() -> anyhow::Result<()> {
    init_tracing();
    let h = Harness::new();
    let wallet = h.funded_wallet("agent-1", limits(100, 40)).await;

    let receipt = h.service.execute(native("agent-1", 2, 30)).await?;

    assert_eq!(receipt.amount, Amount(30));
    assert_eq!(receipt.recipient, addr(2));
    assert_eq!(receipt.block_number, Some(1));
    assert_eq!(receipt.gas_limit, 21_000);

    let submitted = h.chain.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].hash, receipt.hash);
    assert_eq!(recover_signer(&submitted[0])?, wallet.address);

    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(30));
    Ok(())
}

#[tokio::test]
async fn test_limit_sequence_reports_per_transaction_limit() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;

    h.service.execute(native("agent-1", 2, 30)).await.unwrap();
    h.service.execute(native("agent-1", 2, 30)).await.unwrap();

    let err = h.service.execute(native("agent-1", 2, 50)).await.unwrap_err();
    assert_eq!(
        err,
        WalletError::TransactionLimitExceeded {
            requested: 50,
            limit: 40
        }
    );
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(60));

    h.service.execute(native("agent-1", 2, 40)).await.unwrap();
    let err = h.service.execute(native("agent-1", 2, 1)).await.unwrap_err();
    assert!(matches!(err, WalletError::DailyLimitExceeded { spent: 100, .. }));
}

#[tokio::test]
async fn test_recipient_not_allowed() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40).allow_recipient(addr(1)))
        .await;

    for amount in [1, 40] {
        let err = h
            .service
            .execute(native("agent-1", 2, amount))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::RecipientNotAllowed { .. }));
    }

    assert!(h.chain.submitted().await.is_empty());
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
    assert!(h.service.execute(native("agent-1", 1, 40)).await.is_ok());
}

#[tokio::test]
async fn test_submission_failure_rolls_back_and_retry_succeeds() {
    init_tracing();
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;
    h.service.execute(native("agent-1", 2, 10)).await.unwrap();

    h.chain.fail_next_submissions(1);
    let err = h.service.execute(native("agent-1", 2, 30)).await.unwrap_err();
    assert!(matches!(err, WalletError::SubmissionFailed { .. }));
    assert!(err.is_retriable());
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(10));

    h.service.execute(native("agent-1", 2, 30)).await.unwrap();
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(40));
    assert_eq!(h.chain.submitted().await.len(), 2);
}

#[tokio::test]
async fn test_rejected_submission_rolls_back() {
    let h = Harness::new();
    // Provisioned but never funded: the chain rejects for insufficient funds
    h.service
        .provision(AgentId::new("agent-1"), limits(100, 40))
        .await
        .unwrap();

    let err = h.service.execute(native("agent-1", 2, 30)).await.unwrap_err();
    assert!(matches!(err, WalletError::SubmissionFailed { .. }));
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_cannot_overspend() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 100)).await;
    h.chain.set_submit_delay(Duration::from_millis(50));

    let first = h.service.clone();
    let second = h.service.clone();
    let (a, b) = futures::future::join(
        tokio::spawn(async move { first.execute(native("agent-1", 2, 60)).await }),
        tokio::spawn(async move { second.execute(native("agent-1", 3, 60)).await }),
    )
    .await;
    let outcomes = [a.unwrap(), b.unwrap()];

    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let denied = outcomes
        .iter()
        .filter(|r| matches!(r, Err(WalletError::DailyLimitExceeded { .. })))
        .count();
    assert_eq!(denied, 1);

    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(60));
    assert_eq!(h.chain.submitted().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_small_spends_fill_limit_exactly() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 10)).await;

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let service = h.service.clone();
            tokio::spawn(async move { service.execute(native("agent-1", 2, 10)).await })
        })
        .collect();

    let mut succeeded = 0;
    for outcome in futures::future::join_all(tasks).await {
        match outcome.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, WalletError::DailyLimitExceeded { .. })),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(100));
}

#[tokio::test]
async fn test_unauthorized_claim_rolls_back() {
    let h = Harness::with_claims(test_config(), Arc::new(ImpostorClaims));
    h.funded_wallet("agent-1", limits(100, 40)).await;

    let err = h.service.execute(native("agent-1", 2, 30)).await.unwrap_err();
    assert!(matches!(err, WalletError::Unauthorized { .. }));
    assert!(!err.is_retriable());
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
    assert!(h.chain.submitted().await.is_empty());
}

#[tokio::test]
async fn test_authorization_timeout_is_unauthorized() {
    let h = Harness::with_claims(test_config(), Arc::new(StalledClaims));
    h.funded_wallet("agent-1", limits(100, 40)).await;

    let err = h.service.execute(native("agent-1", 2, 30)).await.unwrap_err();
    assert_eq!(err, WalletError::unauthorized("authorization timed out"));
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
}

#[tokio::test]
async fn test_submission_timeout_rolls_back() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;
    h.chain.set_submit_delay(Duration::from_millis(1_500));

    let err = h.service.execute(native("agent-1", 2, 30)).await.unwrap_err();
    assert_eq!(err, WalletError::submission_failed("submission timed out"));
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
    assert!(h.chain.submitted().await.is_empty());
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let h = Harness::new();
    let err = h.service.execute(native("ghost", 2, 1)).await.unwrap_err();
    assert_eq!(err, WalletError::not_found("ghost"));
}

#[tokio::test]
async fn test_unknown_and_denied_requests_leave_no_state() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;

    for i in 0..200 {
        let agent = format!("ghost-{i}");
        let err = h.service.execute(native(&agent, 2, 1)).await.unwrap_err();
        assert_eq!(err, WalletError::not_found(&agent));
        let err = h
            .service
            .update_limits(&AgentId::new(agent.as_str()), limits(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NotFound { .. }));
    }
    for _ in 0..10 {
        let err = h.service.execute(native("agent-1", 2, 41)).await.unwrap_err();
        assert!(matches!(err, WalletError::TransactionLimitExceeded { .. }));
    }
    h.chain.fail_next_submissions(1);
    assert!(h.service.execute(native("agent-1", 2, 10)).await.is_err());

    assert!(h.service.locks().is_empty());
    assert!(h.service.ledger().is_empty());
}

#[tokio::test]
async fn test_explicit_gas_limit_is_kept() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;

    let receipt = h
        .service
        .execute(native("agent-1", 2, 5).with_gas_limit(50_000))
        .await
        .unwrap();
    assert_eq!(receipt.gas_limit, 50_000);
    assert_eq!(h.chain.submitted().await[0].transaction.gas_limit, 50_000);
}

#[tokio::test]
async fn test_payload_on_token_transfer_is_invalid() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 40)).await;

    let request = TransactionRequest::token(
        AgentId::new("agent-1"),
        addr(2),
        common::pyusd(),
        Amount(5),
    )
    .with_payload(vec![1]);
    let err = h.service.execute(request).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidRequest { .. }));
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
}

#[tokio::test]
async fn test_token_not_allowed() {
    let h = Harness::new();
    h.funded_wallet(
        "agent-1",
        limits(100, 40).allow_token(TokenId::Contract(common::pyusd())),
    )
    .await;

    let err = h.service.execute(native("agent-1", 2, 5)).await.unwrap_err();
    assert!(matches!(err, WalletError::TokenNotAllowed { .. }));

    let request =
        TransactionRequest::token(AgentId::new("agent-1"), addr(2), common::pyusd(), Amount(5));
    assert!(h.service.execute(request).await.is_ok());
}

#[tokio::test]
async fn test_daily_limit_resets_next_day() {
    let h = Harness::new();
    h.funded_wallet("agent-1", limits(100, 100)).await;

    h.service.execute(native("agent-1", 2, 100)).await.unwrap();
    let err = h.service.execute(native("agent-1", 2, 1)).await.unwrap_err();
    assert!(matches!(err, WalletError::DailyLimitExceeded { .. }));

    h.clock.advance(chrono::Duration::days(1));
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount::ZERO);
    h.service.execute(native("agent-1", 2, 100)).await.unwrap();

    assert_eq!(h.service.prune_ledger(), 1);
    assert_eq!(h.service.spent_today(&AgentId::new("agent-1")), Amount(100));
}
