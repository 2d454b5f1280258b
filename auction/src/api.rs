use {
    crate::{
        auction,
        config::RunOptions,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::Store,
    },
    anyhow::Result,
    axum::{
        extract::State,
        http::StatusCode,
        response::{
            IntoResponse,
            Response,
        },
        routing::{
            get,
            post,
        },
        Json,
        Router,
    },
    clap::crate_version,
    live_auction_api_types::{
        ws::{
            ClientMessage,
            RejectReason,
            ServerUpdateResponse,
        },
        CatalogResponse,
        ErrorBodyResponse,
        Lot,
    },
    std::sync::{
        atomic::Ordering,
        Arc,
    },
    tower_http::cors::CorsLayer,
    utoipa::OpenApi,
    utoipa_redoc::{
        Redoc,
        Servable,
    },
};

pub mod ws;

pub enum RestError {
    /// The requester already has too many open websocket connections
    TooManyOpenWebsocketConnections,
}

impl RestError {
    pub fn to_status_and_message(&self) -> (StatusCode, String) {
        match self {
            RestError::TooManyOpenWebsocketConnections => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many open websocket connections".to_string(),
            ),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let (status, msg) = self.to_status_and_message();
        (status, Json(ErrorBodyResponse { error: msg })).into_response()
    }
}

async fn root() -> String {
    format!("Live Auction Server API {}", crate_version!())
}

pub async fn live() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Fetch the full lot catalog together with the current server time.
///
/// Clients compute their clock offset from `serverTime` once per fetch;
/// reconnecting observers call this again instead of relying on any
/// buffered delivery of missed events.
#[utoipa::path(get, path = "/items", responses(
    (status = 200, description = "The full lot catalog and the server clock", body = CatalogResponse)
),)]
pub async fn get_items(State(store): State<Arc<Store>>) -> Json<CatalogResponse> {
    Json(store.snapshot().await)
}

/// Reinitialize every lot to its starting price with a fresh close time.
///
/// The response carries no payload; the new baseline reaches every
/// observer, including the caller, through a single `AUCTIONS_RESET`
/// broadcast.
#[utoipa::path(post, path = "/reset", responses(
    (status = 200, description = "All lots were reset")
),)]
pub async fn reset(State(store): State<Arc<Store>>) -> StatusCode {
    auction::reset_all(&store).await;
    StatusCode::OK
}

pub async fn start_api(run_options: RunOptions, store: Arc<Store>) -> Result<()> {
    #[derive(OpenApi)]
    #[openapi(
    paths(
    get_items,
    reset,
    ),
    components(
    schemas(
    Lot,
    CatalogResponse,
    ClientMessage,
    ServerUpdateResponse,
    RejectReason,
    ErrorBodyResponse,
    ),
    responses(
    CatalogResponse,
    ErrorBodyResponse,
    ),
    ),
    tags(
    (name = "Live Auction Server", description = "The server holds the authoritative bidding state for a fixed \
    catalog of lots, serializes conflicting bids per lot, and pushes every accepted bid to all connected observers.")
    )
    )]
    struct ApiDoc;

    let app: Router<()> = Router::new()
        .merge(Redoc::with_url("/docs", ApiDoc::openapi()))
        .route("/", get(root))
        .route("/live", get(live))
        .route("/items", get(get_items))
        .route("/reset", post(reset))
        .route("/ws", get(ws::ws_route_handler))
        .layer(CorsLayer::permissive())
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr).await?;
    tracing::info!(
        listen_addr = %run_options.server.listen_addr,
        "Auction server listening..."
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down API server...");
        })
        .await?;
    Ok(())
}
