use {
    crate::{
        api::ws::WsState,
        config::Config,
    },
    live_auction_api_types::{
        self as api_types,
        Amount,
        BidderId,
        CatalogResponse,
        LotId,
    },
    std::{
        collections::HashMap,
        sync::Arc,
        time::Duration,
    },
    time::OffsetDateTime,
    tokio::sync::{
        Mutex,
        RwLock,
    },
};

/// One auction lot. Owned exclusively by the [`Store`]; the bidding
/// fields are only mutated while the lot's lane is held.
#[derive(Clone, Debug)]
pub struct Lot {
    pub id:             LotId,
    pub title:          String,
    pub starting_price: Amount,
    pub current_bid:    Amount,
    pub highest_bidder: Option<BidderId>,
    pub end_time:       OffsetDateTime,
    /// Configured bidding window; a reset reopens the lot for this long.
    pub duration:       Duration,
}

impl Lot {
    /// Starts a fresh bidding epoch for this lot.
    pub fn reopen(&mut self, now: OffsetDateTime) {
        self.current_bid = self.starting_price;
        self.highest_bidder = None;
        self.end_time = now + self.duration;
    }
}

impl From<&Lot> for api_types::Lot {
    fn from(lot: &Lot) -> Self {
        Self {
            id:             lot.id.clone(),
            title:          lot.title.clone(),
            starting_price: lot.starting_price,
            current_bid:    lot.current_bid,
            highest_bidder: lot.highest_bidder.clone(),
            end_time:       lot.end_time,
        }
    }
}

/// The lane serializing all bid evaluation for one lot.
pub type LotLock = Arc<Mutex<()>>;

/// The single source of truth for bidding state. Explicitly owned and
/// injected (`Arc<Store>`) so tests can construct isolated instances.
pub struct Store {
    pub lots:      RwLock<HashMap<LotId, Lot>>,
    pub ws:        WsState,
    catalog_order: Vec<LotId>,
    lot_locks:     Mutex<HashMap<LotId, LotLock>>,
}

impl Store {
    pub fn initialize(config: &Config, ws: WsState, now: OffsetDateTime) -> Self {
        let lots = config
            .lots
            .iter()
            .map(|lot| {
                (
                    lot.id.clone(),
                    Lot {
                        id:             lot.id.clone(),
                        title:          lot.title.clone(),
                        starting_price: lot.starting_price,
                        current_bid:    lot.starting_price,
                        highest_bidder: None,
                        end_time:       now + lot.duration,
                        duration:       lot.duration,
                    },
                )
            })
            .collect();
        Self {
            lots: RwLock::new(lots),
            ws,
            catalog_order: config.lots.iter().map(|lot| lot.id.clone()).collect(),
            lot_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the lane for `item_id`, or `None` for a lot that is not
    /// in the catalog (in which case no lane is created or touched).
    /// Lanes are created lazily on first reference and never destroyed;
    /// the catalog is fixed, so the map never grows past it.
    pub async fn lot_lock(&self, item_id: &LotId) -> Option<LotLock> {
        if !self.lots.read().await.contains_key(item_id) {
            return None;
        }
        Some(
            self.lot_locks
                .lock()
                .await
                .entry(item_id.clone())
                .or_default()
                .clone(),
        )
    }

    /// Returns every lot's lane, in catalog order. Used by the reset
    /// path to quiesce the whole catalog.
    pub async fn all_lot_locks(&self) -> Vec<LotLock> {
        let mut locks = self.lot_locks.lock().await;
        self.catalog_order
            .iter()
            .map(|id| locks.entry(id.clone()).or_default().clone())
            .collect()
    }

    pub async fn snapshot(&self) -> CatalogResponse {
        self.snapshot_at(OffsetDateTime::now_utc()).await
    }

    /// Full catalog in its configured order, stamped with `server_time`
    /// so observers can reconcile their local clocks.
    pub async fn snapshot_at(&self, server_time: OffsetDateTime) -> CatalogResponse {
        let lots = self.lots.read().await;
        CatalogResponse {
            items: self
                .catalog_order
                .iter()
                .filter_map(|id| lots.get(id))
                .map(api_types::Lot::from)
                .collect(),
            server_time,
        }
    }
}
