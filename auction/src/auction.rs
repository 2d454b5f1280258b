use {
    crate::{
        api::ws::UpdateEvent,
        state::{
            Lot,
            Store,
        },
    },
    live_auction_api_types::{
        ws::RejectReason,
        Amount,
        BidderId,
        CatalogResponse,
        LotId,
    },
    time::OffsetDateTime,
};

/// Outcome of evaluating a single bid. Produced once per submission,
/// delivered, then discarded; never stored.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Accepted {
        item_id:   LotId,
        amount:    Amount,
        bidder_id: BidderId,
        end_time:  OffsetDateTime,
    },
    Rejected {
        item_id:     Option<LotId>,
        reason:      RejectReason,
        current_bid: Option<Amount>,
    },
}

/// Pure bid decision for a lot that exists. Unknown lots are rejected
/// by [`process_bid`] before any lane is acquired, so this covers the
/// in-lane checks only, in order: auction closed, then not a strict
/// improvement over the current bid. Any strictly greater amount is
/// accepted; increment sizing is a client convention.
pub fn evaluate(lot: &Lot, amount: Amount, bidder_id: &BidderId, now: OffsetDateTime) -> Outcome {
    if now >= lot.end_time {
        return Outcome::Rejected {
            item_id:     Some(lot.id.clone()),
            reason:      RejectReason::AuctionEnded,
            current_bid: None,
        };
    }
    if amount <= lot.current_bid {
        // Covers both an amount below the floor and one that lost the
        // race to a just-committed higher bid.
        return Outcome::Rejected {
            item_id:     Some(lot.id.clone()),
            reason:      RejectReason::Outbid,
            current_bid: Some(lot.current_bid),
        };
    }
    Outcome::Accepted {
        item_id:   lot.id.clone(),
        amount,
        bidder_id: bidder_id.clone(),
        end_time:  lot.end_time,
    }
}

/// Runs the full read-decide-mutate-publish sequence for one bid under
/// the lot's lane. Concurrent bids for the same lot queue up in arrival
/// order; bids for distinct lots proceed in parallel. The `UPDATE_BID`
/// broadcast is published while the lane is still held, so per-lot
/// broadcast order always matches commit order. Nothing here blocks on
/// network I/O; the publish is a channel send.
#[tracing::instrument(skip(store), fields(result))]
pub async fn process_bid(
    store: &Store,
    item_id: LotId,
    amount: Amount,
    bidder_id: BidderId,
) -> Outcome {
    let Some(lock) = store.lot_lock(&item_id).await else {
        tracing::Span::current().record("result", "invalid_item");
        return Outcome::Rejected {
            item_id:     Some(item_id),
            reason:      RejectReason::InvalidItem,
            current_bid: None,
        };
    };

    let _lane = lock.lock().await;
    let now = OffsetDateTime::now_utc();
    let outcome = {
        let lots = store.lots.read().await;
        // The lane lookup above already proved presence and the catalog
        // is fixed for process lifetime.
        match lots.get(&item_id) {
            Some(lot) => evaluate(lot, amount, &bidder_id, now),
            None => Outcome::Rejected {
                item_id:     Some(item_id.clone()),
                reason:      RejectReason::InvalidItem,
                current_bid: None,
            },
        }
    };

    if let Outcome::Accepted {
        amount,
        bidder_id,
        end_time,
        ..
    } = &outcome
    {
        {
            let mut lots = store.lots.write().await;
            if let Some(lot) = lots.get_mut(&item_id) {
                lot.current_bid = *amount;
                lot.highest_bidder = Some(bidder_id.clone());
            }
        }
        store.ws.broadcast(UpdateEvent::BidAccepted {
            item_id:   item_id.clone(),
            amount:    *amount,
            bidder_id: bidder_id.clone(),
            end_time:  *end_time,
        });
        tracing::Span::current().record("result", "accepted");
        tracing::debug!(%item_id, amount, "Accepted bid.");
    } else {
        tracing::Span::current().record("result", "rejected");
    }
    outcome
}

/// Reinitializes every lot and announces the new baseline as a single
/// `AUCTIONS_RESET` event. Every lot's lane is taken, in catalog order,
/// before any record is touched, so no bid evaluation can interleave
/// and no observer ever sees a partially reset catalog. Lanes are
/// released only after the broadcast is published.
#[tracing::instrument(skip(store))]
pub async fn reset_all(store: &Store) -> CatalogResponse {
    let locks = store.all_lot_locks().await;
    let mut lanes = Vec::with_capacity(locks.len());
    for lock in &locks {
        lanes.push(lock.lock().await);
    }

    let now = OffsetDateTime::now_utc();
    {
        let mut lots = store.lots.write().await;
        for lot in lots.values_mut() {
            lot.reopen(now);
        }
    }

    let snapshot = store.snapshot_at(now).await;
    store.ws.broadcast(UpdateEvent::AuctionsReset(snapshot.clone()));
    tracing::info!(lots = snapshot.items.len(), "Reset all auctions.");
    snapshot
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            api::ws::WsState,
            config::{
                Config,
                LotConfig,
            },
        },
        std::{
            sync::Arc,
            time::Duration,
        },
        tokio::sync::broadcast::error::TryRecvError,
    };

    fn lot_config(id: &str, title: &str, starting_price: Amount, secs: u64) -> LotConfig {
        LotConfig {
            id: id.to_string(),
            title: title.to_string(),
            starting_price,
            duration: Duration::from_secs(secs),
        }
    }

    fn catalog() -> Config {
        Config {
            lots: vec![
                lot_config("item-1", "Vintage Camera", 50, 600),
                lot_config("item-2", "Signed Vinyl", 30, 720),
                lot_config("item-3", "Antique Watch", 120, 780),
                lot_config("item-4", "Collectible Card", 5, 900),
            ],
        }
    }

    fn new_store() -> Arc<Store> {
        Arc::new(Store::initialize(
            &catalog(),
            WsState::new("X-Forwarded-For".to_string(), 1000),
            OffsetDateTime::now_utc(),
        ))
    }

    fn open_lot(current_bid: Amount) -> Lot {
        Lot {
            id:             "item-1".to_string(),
            title:          "Vintage Camera".to_string(),
            starting_price: 50,
            current_bid,
            highest_bidder: None,
            end_time:       OffsetDateTime::now_utc() + Duration::from_secs(600),
            duration:       Duration::from_secs(600),
        }
    }

    #[test]
    fn strictly_greater_bid_is_accepted() {
        let lot = open_lot(50);
        let outcome = evaluate(&lot, 51, &"bidder-a".to_string(), OffsetDateTime::now_utc());
        assert_eq!(
            outcome,
            Outcome::Accepted {
                item_id:   "item-1".to_string(),
                amount:    51,
                bidder_id: "bidder-a".to_string(),
                end_time:  lot.end_time,
            }
        );
    }

    #[test]
    fn equal_bid_is_outbid_with_committed_amount() {
        let lot = open_lot(60);
        for amount in [60, 55] {
            let outcome =
                evaluate(&lot, amount, &"bidder-a".to_string(), OffsetDateTime::now_utc());
            assert_eq!(
                outcome,
                Outcome::Rejected {
                    item_id:     Some("item-1".to_string()),
                    reason:      RejectReason::Outbid,
                    current_bid: Some(60),
                }
            );
        }
    }

    #[test]
    fn closed_check_runs_before_amount_check() {
        let mut lot = open_lot(50);
        lot.end_time = OffsetDateTime::now_utc() - Duration::from_secs(1);
        // A hopeless amount on an ended auction still reports AUCTION_ENDED.
        let outcome = evaluate(&lot, 10, &"bidder-a".to_string(), OffsetDateTime::now_utc());
        assert_eq!(
            outcome,
            Outcome::Rejected {
                item_id:     Some("item-1".to_string()),
                reason:      RejectReason::AuctionEnded,
                current_bid: None,
            }
        );
    }

    #[test]
    fn close_boundary_is_exclusive() {
        let lot = open_lot(50);
        let bidder = "bidder-a".to_string();

        let at_close = evaluate(&lot, 60, &bidder, lot.end_time);
        assert!(matches!(
            at_close,
            Outcome::Rejected {
                reason: RejectReason::AuctionEnded,
                ..
            }
        ));

        let just_before = evaluate(&lot, 60, &bidder, lot.end_time - Duration::from_millis(1));
        assert!(matches!(just_before, Outcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn accepted_bid_commits_and_broadcasts_to_everyone() {
        let store = new_store();
        let mut events = store.ws.subscribe();

        let outcome = process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;
        assert!(matches!(outcome, Outcome::Accepted { amount: 60, .. }));

        let lots = store.lots.read().await;
        assert_eq!(lots["item-1"].current_bid, 60);
        assert_eq!(lots["item-1"].highest_bidder.as_deref(), Some("b1"));

        match events.try_recv().unwrap() {
            UpdateEvent::BidAccepted {
                item_id,
                amount,
                bidder_id,
                end_time,
            } => {
                assert_eq!(item_id, "item-1");
                assert_eq!(amount, 60);
                assert_eq!(bidder_id, "b1");
                assert_eq!(end_time, lots["item-1"].end_time);
            }
            other => panic!("expected a bid broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_bid_is_rejected_without_broadcast() {
        let store = new_store();
        process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;
        let mut events = store.ws.subscribe();

        let outcome = process_bid(&store, "item-1".to_string(), 55, "b2".to_string()).await;
        assert_eq!(
            outcome,
            Outcome::Rejected {
                item_id:     Some("item-1".to_string()),
                reason:      RejectReason::Outbid,
                current_bid: Some(60),
            }
        );

        // Only the requester learns of a rejection.
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(store.lots.read().await["item-1"].current_bid, 60);
    }

    #[tokio::test]
    async fn unknown_lot_is_rejected_with_no_mutation() {
        let store = new_store();
        let mut events = store.ws.subscribe();
        let before = store.snapshot().await.items;

        let outcome = process_bid(&store, "item-99".to_string(), 100, "b1".to_string()).await;
        assert_eq!(
            outcome,
            Outcome::Rejected {
                item_id:     Some("item-99".to_string()),
                reason:      RejectReason::InvalidItem,
                current_bid: None,
            }
        );
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(store.snapshot().await.items, before);
    }

    #[tokio::test]
    async fn ended_auction_rejects_bids_until_reset() {
        let store = new_store();
        store
            .lots
            .write()
            .await
            .get_mut("item-1")
            .unwrap()
            .end_time = OffsetDateTime::now_utc() - Duration::from_secs(1);

        let outcome = process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected {
                reason: RejectReason::AuctionEnded,
                ..
            }
        ));
        assert_eq!(store.lots.read().await["item-1"].current_bid, 50);

        reset_all(&store).await;
        let outcome = process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;
        assert!(matches!(outcome, Outcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn rejection_is_idempotent() {
        let store = new_store();
        process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;

        let first = process_bid(&store, "item-1".to_string(), 55, "b2".to_string()).await;
        let second = process_bid(&store, "item-1".to_string(), 55, "b2".to_string()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn concurrent_bids_on_one_lot_serialize_without_lost_updates() {
        let store = new_store();
        let mut events = store.ws.subscribe();

        let mut handles = Vec::new();
        for i in 1..=50u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                process_bid(&store, "item-1".to_string(), 50 + i, format!("bidder-{i}")).await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Outcome::Accepted { .. }) {
                accepted += 1;
            }
        }

        // The highest amount always wins regardless of interleaving.
        let lots = store.lots.read().await;
        assert_eq!(lots["item-1"].current_bid, 100);
        assert_eq!(lots["item-1"].highest_bidder.as_deref(), Some("bidder-50"));
        drop(lots);

        // Exactly one broadcast per accepted bid, in commit order.
        let mut amounts = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                UpdateEvent::BidAccepted { amount, .. } => amounts.push(amount),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(amounts.len(), accepted);
        assert!(amounts.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(amounts.last(), Some(&100));
    }

    #[tokio::test]
    async fn losing_racer_sees_the_winners_committed_amount() {
        let store = new_store();
        process_bid(&store, "item-1".to_string(), 60, "b0".to_string()).await;

        let first = tokio::spawn({
            let store = store.clone();
            async move { process_bid(&store, "item-1".to_string(), 70, "b1".to_string()).await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { process_bid(&store, "item-1".to_string(), 75, "b2".to_string()).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        // 75 always ends up committed; 70 either landed first and was
        // then outbid, or lost the race outright.
        assert_eq!(store.lots.read().await["item-1"].current_bid, 75);
        if let Some(Outcome::Rejected {
            reason,
            current_bid,
            ..
        }) = outcomes
            .iter()
            .find(|outcome| matches!(outcome, Outcome::Rejected { .. }))
        {
            assert_eq!(*reason, RejectReason::Outbid);
            assert_eq!(*current_bid, Some(75));
        }
    }

    #[tokio::test]
    async fn bids_on_distinct_lots_do_not_block_each_other() {
        let store = new_store();
        let lock = store.lot_lock(&"item-1".to_string()).await.unwrap();
        let _lane = lock.lock().await;

        // A held lane on item-1 stalls item-1 bids...
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            process_bid(&store, "item-1".to_string(), 60, "b1".to_string()),
        )
        .await;
        assert!(blocked.is_err());

        // ...but item-2 proceeds immediately.
        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            process_bid(&store, "item-2".to_string(), 40, "b1".to_string()),
        )
        .await
        .expect("a bid on an independent lot must not wait");
        assert!(matches!(outcome, Outcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn reset_restores_every_lot_and_broadcasts_once() {
        let store = new_store();
        process_bid(&store, "item-1".to_string(), 60, "b1".to_string()).await;
        process_bid(&store, "item-3".to_string(), 200, "b2".to_string()).await;

        let mut events = store.ws.subscribe();
        let before = OffsetDateTime::now_utc();
        let snapshot = reset_all(&store).await;

        assert_eq!(snapshot.items.len(), 4);
        for lot in &snapshot.items {
            assert_eq!(lot.current_bid, lot.starting_price);
            assert!(lot.highest_bidder.is_none());
            assert!(lot.end_time > before);
        }

        // One atomic event carrying the whole new baseline, nothing else.
        match events.try_recv().unwrap() {
            UpdateEvent::AuctionsReset(broadcast) => assert_eq!(broadcast, snapshot),
            other => panic!("expected a reset broadcast, got {other:?}"),
        }
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        let lots = store.lots.read().await;
        assert_eq!(lots["item-1"].current_bid, 50);
        assert_eq!(lots["item-3"].current_bid, 120);
    }

    #[tokio::test]
    async fn reset_preserves_relative_close_ordering() {
        let store = new_store();
        let snapshot = reset_all(&store).await;
        let end_times: Vec<_> = snapshot.items.iter().map(|lot| lot.end_time).collect();
        let mut sorted = end_times.clone();
        sorted.sort();
        assert_eq!(end_times, sorted);
    }

    #[tokio::test]
    async fn reset_waits_for_in_flight_evaluation() {
        let store = new_store();
        let lock = store.lot_lock(&"item-2".to_string()).await.unwrap();
        let lane = lock.lock().await;

        let reset = tokio::spawn({
            let store = store.clone();
            async move { reset_all(&store).await }
        });
        // With item-2's lane held, the reset cannot commit.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!reset.is_finished());

        drop(lane);
        let snapshot = tokio::time::timeout(Duration::from_secs(1), reset)
            .await
            .expect("reset must finish once all lanes are free")
            .unwrap();
        assert_eq!(snapshot.items.len(), 4);
    }
}
