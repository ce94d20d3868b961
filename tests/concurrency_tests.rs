mod util;

use forge_ledger::consensus::{AcceptAll, AuthorityPolicy};
use forge_ledger::ledger::LedgerError;
use forge_ledger::shared::SharedLedger;
use forge_ledger::value::Dimension;
use std::collections::BTreeMap;
use std::sync::Arc;
use util::*;

#[tokio::test]
async fn concurrent_proposals_at_the_same_height_admit_exactly_one() {
    init_tracing();
    let shared = SharedLedger::new(genesis_ledger(), Arc::new(AcceptAll));

    let first = shared
        .create_candidate_block("author-1", vec![], None, BTreeMap::new())
        .await
        .unwrap();
    let second = shared
        .create_candidate_block("author-2", vec![], None, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(first.index, second.index);

    let a = tokio::spawn({
        let shared = shared.clone();
        async move { shared.append_block(first).await }
    });
    let b = tokio::spawn({
        let shared = shared.clone();
        async move { shared.append_block(second).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        LedgerError::BadIndex { .. } | LedgerError::BadPreviousHash { .. }
    ));
    assert_eq!(shared.len().await, 2);
    assert!(shared.validate_full_chain().await.is_ok());
}

#[tokio::test]
async fn many_writers_never_break_linkage() {
    let shared = SharedLedger::new(genesis_ledger(), Arc::new(AcceptAll));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            let mut appended = 0;
            for _ in 0..5 {
                // Retry against the latest tip until this proposal lands.
                loop {
                    let block = shared
                        .create_candidate_block(
                            &format!("author-{worker}"),
                            vec![],
                            None,
                            BTreeMap::new(),
                        )
                        .await
                        .unwrap();
                    match shared.append_block(block).await {
                        Ok(_) => {
                            appended += 1;
                            break;
                        }
                        Err(LedgerError::BadIndex { .. })
                        | Err(LedgerError::BadPreviousHash { .. }) => continue,
                        Err(e) => panic!("unexpected rejection: {e}"),
                    }
                }
            }
            appended
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 40);
    assert_eq!(shared.len().await, 41);
    assert!(shared.validate_full_chain().await.is_ok());

    let stats = shared.stats().await;
    assert_eq!(stats.reward_transactions, 40);
    let balances = shared.balances().await;
    let paid: f64 = balances
        .values()
        .filter_map(|dims| dims.get(&Dimension::Knowledge))
        .sum();
    assert_eq!(paid, 400.0);
}

#[tokio::test]
async fn subscribers_observe_every_accepted_block_in_order() {
    let (registry, wallet) = authority();
    let shared = SharedLedger::new(genesis_ledger(), Arc::new(AuthorityPolicy::new(registry)));
    let mut events = shared.subscribe();

    for _ in 0..3 {
        let mut block = shared
            .create_candidate_block(AUTHORITY_ID, vec![], None, BTreeMap::new())
            .await
            .unwrap();
        block.sign(&wallet).unwrap();
        shared.append_block(block).await.unwrap();
    }

    let unsigned = shared
        .create_candidate_block(AUTHORITY_ID, vec![], None, BTreeMap::new())
        .await
        .unwrap();
    assert!(shared.append_block(unsigned).await.is_err());

    for expected in 1..=3 {
        let event = events.recv().await.unwrap();
        assert_eq!(event.index, expected);
        assert_eq!(event.block.author_id, AUTHORITY_ID);
        assert_eq!(event.rewards.len(), 1);
    }
    assert!(events.try_recv().is_err());
    assert_eq!(
        shared.get_balance(AUTHORITY_ID, Dimension::Knowledge).await,
        30.0
    );
}

#[tokio::test]
async fn longer_remote_chain_replaces_local_chain() {
    let local = SharedLedger::new(genesis_ledger(), Arc::new(AcceptAll));
    let remote = SharedLedger::new(genesis_ledger(), Arc::new(AcceptAll));

    for (ledger, blocks, author) in [(&local, 1, "local"), (&remote, 3, "remote")] {
        for _ in 0..blocks {
            let block = ledger
                .create_candidate_block(author, vec![], None, BTreeMap::new())
                .await
                .unwrap();
            ledger.append_block(block).await.unwrap();
        }
    }

    let remote_blocks: Vec<_> = remote
        .export()
        .await
        .blocks
        .into_iter()
        .filter_map(|b| match b {
            forge_ledger::schema::VersionedBlock::V2(block) => Some(block),
            forge_ledger::schema::VersionedBlock::V1(_) => None,
        })
        .collect();

    assert!(local.try_replace_chain(remote_blocks.clone()).await.unwrap());
    assert_eq!(local.len().await, 4);
    assert_eq!(local.tip_hash().await, remote.tip_hash().await);
    assert_eq!(local.get_balance("local", Dimension::Knowledge).await, 0.0);
    assert_eq!(local.get_balance("remote", Dimension::Knowledge).await, 30.0);

    // Equal length never replaces.
    assert!(!local.try_replace_chain(remote_blocks).await.unwrap());
}
