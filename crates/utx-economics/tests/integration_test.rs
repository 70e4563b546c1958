use std::sync::Arc;
use utx_economics::{MemoryStorage, TokenAmount, TokenBank, TokenLedger};
use utx_types::AccountName;

fn name(s: &str) -> AccountName {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_issue_then_fund_pools_lifecycle() {
    let bank = TokenBank::new(
        name("utxio"),
        TokenAmount::from_whole(10_000_000_000),
        Arc::new(MemoryStorage::new()),
    );
    bank.initialize_genesis(TokenAmount::from_whole(1_000_000_000))
        .await
        .unwrap();

    // period issuance lands on the issuer, then moves to the two pools
    let bp = TokenAmount::from_base_units(312_240_297);
    let upay = TokenAmount::from_base_units(1_339_665_568);
    bank.issue(bp.saturating_add(upay), "daily inflation").await.unwrap();
    bank.transfer(&name("utxio"), &name("utxio.bpay"), bp, "operator pay")
        .await
        .unwrap();
    bank.transfer(&name("utxio"), &name("utxio.upay"), upay, "usage pay")
        .await
        .unwrap();

    assert_eq!(bank.balance(&name("utxio.bpay")).await.unwrap(), bp);
    assert_eq!(bank.balance(&name("utxio.upay")).await.unwrap(), upay);
    assert_eq!(
        bank.supply().await.unwrap(),
        TokenAmount::from_whole(1_000_000_000).saturating_add(bp).saturating_add(upay)
    );

    // claim out of the usage pool
    bank.transfer(&name("utxio.upay"), &name("alice"), upay, "usage claim")
        .await
        .unwrap();
    assert_eq!(bank.balance(&name("utxio.upay")).await.unwrap(), TokenAmount::ZERO);
    assert_eq!(bank.balance(&name("alice")).await.unwrap(), upay);

    let history = bank.balances.get_transaction_history(&name("alice")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].memo, "usage claim");
}

#[tokio::test]
async fn test_failed_transfer_leaves_balances_untouched() {
    let bank = TokenBank::in_memory(name("utxio"), TokenAmount::from_whole(1_000));
    bank.initialize_genesis(TokenAmount::from_whole(10)).await.unwrap();

    let err = bank
        .transfer(&name("utxio"), &name("bob"), TokenAmount::from_whole(11), "too much")
        .await;
    assert!(err.is_err());
    assert_eq!(bank.balance(&name("utxio")).await.unwrap(), TokenAmount::from_whole(10));
    assert_eq!(bank.balance(&name("bob")).await.unwrap(), TokenAmount::ZERO);
}

#[tokio::test]
async fn test_concurrent_transfers_conserve_balance() {
    let bank = Arc::new(TokenBank::in_memory(name("utxio"), TokenAmount::from_whole(1_000)));
    bank.initialize_genesis(TokenAmount::from_whole(100)).await.unwrap();

    let mut handles = Vec::new();
    for i in 1..=5 {
        let bank = bank.clone();
        handles.push(tokio::spawn(async move {
            let to: AccountName = format!("user{}", i).parse().unwrap();
            bank.transfer(&name("utxio"), &to, TokenAmount::from_whole(10), "airdrop")
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total: u64 = bank
        .balances
        .get_all_accounts()
        .await
        .unwrap()
        .iter()
        .map(|(_, b)| b.to_base_units())
        .sum();
    assert_eq!(total, TokenAmount::from_whole(100).to_base_units());
    assert_eq!(bank.balance(&name("utxio")).await.unwrap(), TokenAmount::from_whole(50));
}
