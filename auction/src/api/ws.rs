use {
    super::RestError,
    crate::{
        auction::{
            process_bid,
            Outcome,
        },
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::Store,
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
            },
            State,
            WebSocketUpgrade,
        },
        http::HeaderMap,
        response::IntoResponse,
    },
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    live_auction_api_types::{
        ws::{
            ClientMessage,
            RejectReason,
            ServerUpdateResponse,
        },
        Amount,
        BidderId,
        CatalogResponse,
        LotId,
    },
    std::{
        collections::{
            HashMap,
            HashSet,
        },
        net::IpAddr,
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    time::OffsetDateTime,
    tokio::sync::{
        broadcast,
        RwLock,
    },
};

pub struct WsState {
    pub requester_ip_header_name: String,
    subscriber_counter:           AtomicUsize,
    subscriber_per_ip:            RwLock<HashMap<IpAddr, HashSet<SubscriberId>>>,
    broadcast_sender:             broadcast::Sender<UpdateEvent>,
    broadcast_receiver:           broadcast::Receiver<UpdateEvent>,
}

const MAXIMUM_SUBSCRIBERS_PER_IP: usize = 10;

impl WsState {
    pub fn new(requester_ip_header_name: String, broadcast_channel_size: usize) -> Self {
        let (broadcast_sender, broadcast_receiver) = broadcast::channel(broadcast_channel_size);
        Self {
            requester_ip_header_name,
            subscriber_counter: AtomicUsize::new(0),
            subscriber_per_ip: RwLock::new(HashMap::new()),
            broadcast_sender,
            broadcast_receiver,
        }
    }

    /// Publishes an event to every connected subscriber. Delivery is
    /// at-most-once best-effort: a disconnected or lagging observer
    /// misses the event and reconciles by refetching the catalog.
    pub fn broadcast(&self, event: UpdateEvent) {
        // The receiver kept in this struct means a send can only fail
        // if the channel itself is gone.
        if let Err(e) = self.broadcast_sender.send(event) {
            tracing::warn!(error = ?e, "Failed to broadcast update event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.broadcast_receiver.resubscribe()
    }

    /// If the specified IP address has too many open websocket connections, this function will
    /// return none. Otherwise, it will return the new subscriber id.
    pub async fn get_new_subscriber_id(&self, ip: Option<IpAddr>) -> Option<SubscriberId> {
        let id = self.subscriber_counter.fetch_add(1, Ordering::SeqCst);
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            let ids = write_guard.entry(ip).or_insert_with(HashSet::new);
            if ids.len() >= MAXIMUM_SUBSCRIBERS_PER_IP {
                return None;
            }
            ids.insert(id);
        }
        Some(id)
    }

    pub async fn remove_subscriber(&self, id: SubscriberId, ip: Option<IpAddr>) {
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            if let Some(ids) = write_guard.get_mut(&ip) {
                ids.remove(&id);
                if ids.is_empty() {
                    write_guard.remove(&ip);
                }
            }
        }
    }
}

/// State changes fanned out to every observer.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateEvent {
    BidAccepted {
        item_id:   LotId,
        amount:    Amount,
        bidder_id: BidderId,
        end_time:  OffsetDateTime,
    },
    AuctionsReset(CatalogResponse),
}

pub type SubscriberId = usize;

pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    State(store): State<Arc<Store>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ws_state = &store.ws;
    let requester_ip = headers
        .get(ws_state.requester_ip_header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next()) // Only take the first ip if there are multiple
        .and_then(|value| value.trim().parse().ok());

    if requester_ip.is_none() {
        tracing::warn!("Failed to get requester IP address");
    }

    match ws_state.get_new_subscriber_id(requester_ip).await {
        Some(subscriber_id) => {
            ws.on_upgrade(move |socket| websocket_handler(socket, store, subscriber_id, requester_ip))
        }
        None => RestError::TooManyOpenWebsocketConnections.into_response(),
    }
}

async fn websocket_handler(
    stream: WebSocket,
    store: Arc<Store>,
    subscriber_id: SubscriberId,
    requester_ip: Option<IpAddr>,
) {
    let (sender, receiver) = stream.split();
    let notify_receiver = store.ws.subscribe();
    let mut subscriber = Subscriber::new(subscriber_id, store.clone(), notify_receiver, receiver, sender);
    subscriber.run().await;
    store.ws.remove_subscriber(subscriber_id, requester_ip).await;
}

/// Subscriber is an actor that handles a single websocket connection.
/// It forwards every broadcast to the client and evaluates the bids the
/// client submits; rejections go back on this connection only.
pub struct Subscriber {
    id:                  SubscriberId,
    closed:              bool,
    store:               Arc<Store>,
    notify_receiver:     broadcast::Receiver<UpdateEvent>,
    receiver:            SplitStream<WebSocket>,
    sender:              SplitSink<WebSocket, Message>,
    ping_interval:       tokio::time::Interval,
    exit_check_interval: tokio::time::Interval,
    responded_to_ping:   bool,
}

const PING_INTERVAL_DURATION: Duration = Duration::from_secs(30);

impl Subscriber {
    pub fn new(
        id: SubscriberId,
        store: Arc<Store>,
        notify_receiver: broadcast::Receiver<UpdateEvent>,
        receiver: SplitStream<WebSocket>,
        sender: SplitSink<WebSocket, Message>,
    ) -> Self {
        Self {
            id,
            closed: false,
            store,
            notify_receiver,
            receiver,
            sender,
            ping_interval: tokio::time::interval(PING_INTERVAL_DURATION),
            exit_check_interval: tokio::time::interval(EXIT_CHECK_INTERVAL),
            responded_to_ping: true, // We start with true so we don't close the connection immediately
        }
    }

    pub async fn run(&mut self) {
        while !self.closed {
            if let Err(e) = self.handle_next().await {
                tracing::debug!(subscriber = self.id, error = ?e, "Error Handling Subscriber Message.");
                break;
            }
        }
    }

    async fn handle_next(&mut self) -> Result<()> {
        tokio::select! {
            maybe_update_event = self.notify_receiver.recv() => {
                match maybe_update_event {
                    Ok(event) => self.handle_update(event).await,
                    // A lagged receiver has already missed events; close
                    // the connection so the client reconnects and
                    // refetches the full catalog.
                    Err(e) => Err(anyhow!("Error receiving update event: {:?}", e)),
                }
            },
            maybe_message_or_err = self.receiver.next() => {
                self.handle_client_message(
                    maybe_message_or_err.ok_or(anyhow!("Client channel is closed"))??
                ).await
            },
            _ = self.ping_interval.tick() => {
                if !self.responded_to_ping {
                    return Err(anyhow!("Subscriber did not respond to ping. Closing connection."));
                }
                self.responded_to_ping = false;
                self.sender.send(Message::Ping(vec![])).await?;
                Ok(())
            },
            _ = self.exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    self.sender.close().await?;
                    self.closed = true;
                    return Err(anyhow!("Application is shutting down. Closing connection."));
                }
                Ok(())
            }
        }
    }

    async fn send(&mut self, response: &ServerUpdateResponse) -> Result<()> {
        self.sender
            .send(serde_json::to_string(response)?.into())
            .await?;
        Ok(())
    }

    async fn handle_update(&mut self, event: UpdateEvent) -> Result<()> {
        let response = match event {
            UpdateEvent::BidAccepted {
                item_id,
                amount,
                bidder_id,
                end_time,
            } => ServerUpdateResponse::UpdateBid {
                item_id,
                amount,
                bidder_id,
                end_time,
            },
            UpdateEvent::AuctionsReset(snapshot) => ServerUpdateResponse::AuctionsReset {
                items:       snapshot.items,
                server_time: snapshot.server_time,
            },
        };
        self.send(&response).await
    }

    async fn handle_bid_placed(
        &mut self,
        item_id: LotId,
        amount: Amount,
        bidder_id: BidderId,
    ) -> Result<()> {
        match process_bid(&self.store, item_id, amount, bidder_id).await {
            Outcome::Accepted { .. } => {
                // The submitter learns of success through the same
                // UPDATE_BID broadcast every observer receives; there is
                // no separate acknowledgment.
                Ok(())
            }
            Outcome::Rejected {
                item_id,
                reason,
                current_bid,
            } => {
                self.send(&ServerUpdateResponse::BidRejected {
                    item_id,
                    reason,
                    current_bid,
                })
                .await
            }
        }
    }

    async fn handle_client_message(&mut self, message: Message) -> Result<()> {
        let maybe_client_message = match message {
            Message::Close(_) => {
                // Closing the connection. Send the close message to
                // gracefully shut down the connection, otherwise the
                // client might get an abnormal Websocket closure error.
                self.sender.close().await?;
                self.closed = true;
                return Ok(());
            }
            Message::Text(text) => serde_json::from_str::<ClientMessage>(&text),
            Message::Binary(data) => serde_json::from_slice::<ClientMessage>(&data),
            Message::Ping(_) => {
                // Axum will send Pong automatically
                return Ok(());
            }
            Message::Pong(_) => {
                self.responded_to_ping = true;
                return Ok(());
            }
        };

        match maybe_client_message {
            Err(e) => {
                // A frame we cannot parse cannot name a lot; collapse it
                // into the unknown-item rejection, visible only to this
                // connection. The serializer and every other observer are
                // unaffected.
                tracing::debug!(subscriber = self.id, error = %e, "Ignoring malformed client message.");
                self.send(&ServerUpdateResponse::BidRejected {
                    item_id:     None,
                    reason:      RejectReason::InvalidItem,
                    current_bid: None,
                })
                .await
            }
            Ok(ClientMessage::BidPlaced {
                item_id,
                amount,
                bidder_id,
            }) => self.handle_bid_placed(item_id, amount, bidder_id).await,
        }
    }
}
