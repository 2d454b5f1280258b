use {
    crate::{
        api,
        api::ws::WsState,
        config::{
            Config,
            RunOptions,
        },
        state::Store,
    },
    anyhow::anyhow,
    std::{
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    time::OffsetDateTime,
};

const NOTIFICATIONS_CHAN_LEN: usize = 1000;

pub async fn start_server(run_options: RunOptions) -> anyhow::Result<()> {
    tokio::spawn(async move {
        tracing::info!("Registered shutdown signal handler...");
        tokio::signal::ctrl_c().await.unwrap();
        tracing::info!("Shut down signal received, waiting for tasks...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let config = Config::load(&run_options.config.config).map_err(|err| {
        anyhow!(
            "Failed to load lot catalog from file({path}): {:?}",
            err,
            path = run_options.config.config
        )
    })?;

    let ws = WsState::new(
        run_options.server.requester_ip_header_name.clone(),
        NOTIFICATIONS_CHAN_LEN,
    );
    let store = Arc::new(Store::initialize(&config, ws, OffsetDateTime::now_utc()));
    tracing::info!(lots = config.lots.len(), "Opened bidding on the catalog...");

    api::start_api(run_options, store).await
}

// A static exit flag to indicate to running threads that we're shutting down. This is used to
// gracefully shutdown the application.
//
// NOTE: A more idiomatic approach would be to use a tokio::sync::broadcast channel, and to send a
// shutdown signal to all running tasks. However, this is a bit more complicated to implement and
// we don't rely on global state for anything else.
pub(crate) static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
