use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::bus::EventBus;
use crate::cache::{Cache, CacheConfig};
use crate::error::ClientError;
use crate::event::{dispatch_to_handler, EventHandler};
use crate::http::Http;
use crate::model::{Snowflake, VoiceConnectionData};
use crate::router::GatewayEventRouter;
use crate::shard::{self, Shard, ShardAction};
use crate::voice::VoiceNegotiation;

const DEFAULT_API_URL: &str = "https://api.fluxer.app/v1";
const DEFAULT_INTENTS: u64 = 32767;
const VOICE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// The outward half of one shard: how application code talks to it.
#[derive(Clone)]
pub struct ShardHandle {
    pub gateway_tx: mpsc::Sender<String>,
    pub voice: Arc<VoiceNegotiation>,
}

#[derive(Clone)]
pub struct Context {
    pub http: Arc<Http>,
    pub cache: Arc<Cache>,
    pub events: Arc<EventBus>,
    shards: Arc<Vec<ShardHandle>>,
}

impl Context {
    /// The shard whose connection carries events for `guild_id`.
    pub fn shard_for(&self, guild_id: Snowflake) -> Option<&ShardHandle> {
        self.shards.get(guild_id.shard_index(self.shards.len() as u32) as usize)
    }

    /// Joins a voice channel and waits for the server to hand out the
    /// connection details.
    pub async fn join_voice(
        &self,
        guild_id: Snowflake,
        channel_id: Snowflake,
    ) -> Result<VoiceConnectionData, ClientError> {
        let handle = self
            .shard_for(guild_id)
            .ok_or_else(|| ClientError::Voice("client has no shards".into()))?;

        let receiver = handle.voice.begin(guild_id)?;
        let payload = shard::voice_state_update(guild_id, Some(channel_id), false, false);
        if let Err(e) = handle.gateway_tx.send(payload).await {
            handle.voice.cancel(guild_id);
            return Err(ClientError::Voice(e.to_string()));
        }

        match tokio::time::timeout(VOICE_TIMEOUT, receiver).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(ClientError::Voice("voice negotiation abandoned".into())),
            Err(_) => {
                handle.voice.cancel(guild_id);
                Err(ClientError::Voice(
                    "Timed out waiting for VOICE_SERVER_UPDATE".into(),
                ))
            }
        }
    }

    pub async fn leave_voice(&self, guild_id: Snowflake) -> Result<(), ClientError> {
        let handle = self
            .shard_for(guild_id)
            .ok_or_else(|| ClientError::Voice("client has no shards".into()))?;
        handle.voice.cancel(guild_id);
        handle
            .gateway_tx
            .send(shard::voice_state_update(guild_id, None, false, false))
            .await
            .map_err(|e| ClientError::Voice(e.to_string()))
    }
}

pub struct ClientBuilder {
    token: String,
    api_url: String,
    intents: u64,
    shard_count: u32,
    cache_config: CacheConfig,
    handler: Option<Arc<dyn EventHandler>>,
}

impl ClientBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            intents: DEFAULT_INTENTS,
            shard_count: 1,
            cache_config: CacheConfig::default(),
            handler: None,
        }
    }

    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn shard_count(mut self, count: u32) -> Self {
        self.shard_count = count.max(1);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Creates the client and its shards. The event handler, if any, is
    /// attached to the bus here, once.
    pub fn build(self) -> Result<Client, ClientError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = Arc::new(Http::new(&self.token, self.api_url)?);
        let cache = Arc::new(Cache::new(self.cache_config));
        let bus = Arc::new(EventBus::new());
        let router = Arc::new(GatewayEventRouter::new(cache.clone(), bus.clone()));

        let mut handles = Vec::with_capacity(self.shard_count as usize);
        let mut pending = Vec::with_capacity(self.shard_count as usize);
        for id in 0..self.shard_count {
            let (gateway_tx, gateway_rx) = mpsc::channel::<String>(32);
            let voice = Arc::new(VoiceNegotiation::new());
            handles.push(ShardHandle {
                gateway_tx,
                voice: voice.clone(),
            });
            pending.push((Shard::new(id, self.shard_count, router.clone(), voice), gateway_rx));
        }

        let context = Context {
            http: http.clone(),
            cache: cache.clone(),
            events: bus.clone(),
            shards: Arc::new(handles),
        };
        if let Some(handler) = self.handler {
            let ctx = context.clone();
            bus.subscribe_all(move |event| {
                let handler = handler.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    dispatch_to_handler(handler.as_ref(), ctx, event).await;
                });
                Ok(())
            });
        }

        Ok(Client {
            http,
            cache,
            bus,
            router,
            intents: self.intents,
            context,
            pending,
        })
    }
}

pub struct Client {
    pub(crate) http: Arc<Http>,
    cache: Arc<Cache>,
    bus: Arc<EventBus>,
    router: Arc<GatewayEventRouter>,
    intents: u64,
    context: Context,
    pending: Vec<(Shard, mpsc::Receiver<String>)>,
}

impl Client {
    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(token)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The bus to subscribe on. Subscribe before [`start`](Self::start) to
    /// see the first `READY`.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn router(&self) -> &Arc<GatewayEventRouter> {
        &self.router
    }

    pub fn context(&self) -> Context {
        self.context.clone()
    }

    /// Connects every shard and runs until they all stop.
    ///
    /// Shards reconnect on their own; this only returns once a shard hits an
    /// error it cannot recover from, such as a rejected token. Calling it
    /// again after the shards were handed out returns at once.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            log::debug!("client already started, no shards left to run");
            return Ok(());
        }

        let gateway = self.http.get_gateway().await?;
        let mut gateway_url = Url::parse(&gateway.url)?;
        gateway_url
            .query_pairs_mut()
            .append_pair("v", "1")
            .append_pair("encoding", "json");
        if let Some(recommended) = gateway.shards {
            if recommended as usize > self.context.shards.len() {
                log::info!(
                    "gateway recommends {} shards, running {}",
                    recommended,
                    self.context.shards.len()
                );
            }
        }

        let token = self.http.get_token().to_string();
        let mut tasks = Vec::with_capacity(self.pending.len());
        for (shard, outgoing) in self.pending.drain(..) {
            tasks.push(tokio::spawn(run_shard(
                shard,
                token.clone(),
                self.intents,
                gateway_url.clone(),
                outgoing,
            )));
        }

        let mut result = Ok(());
        for outcome in futures::future::join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => log::error!("shard task failed: {}", e),
            }
        }
        result
    }
}

/// Keeps one shard connected, reconnecting with exponential backoff.
async fn run_shard(
    mut shard: Shard,
    token: String,
    intents: u64,
    gateway_url: Url,
    mut outgoing: mpsc::Receiver<String>,
) -> Result<(), ClientError> {
    let mut backoff = Duration::from_secs(1);
    loop {
        match connect_once(&mut shard, &token, intents, &gateway_url, &mut outgoing).await {
            Ok(()) => {
                backoff = Duration::from_secs(1);
                log::info!("shard {}: reconnecting", shard.id());
            }
            Err(e @ ClientError::SessionRejected(_)) => return Err(e),
            Err(e) => {
                log::warn!("shard {}: connection lost: {}, retrying in {:?}", shard.id(), e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Close codes after which reconnecting cannot help.
fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn send(write: &mut WsWriter, payload: String) -> Result<(), ClientError> {
    write.send(WsMessage::Text(payload.into())).await?;
    Ok(())
}

/// Runs one connection until the gateway asks for a reconnect (`Ok`) or the
/// socket fails (`Err`).
async fn connect_once(
    shard: &mut Shard,
    token: &str,
    intents: u64,
    gateway_url: &Url,
    outgoing: &mut mpsc::Receiver<String>,
) -> Result<(), ClientError> {
    let url = match (&shard.session().resume_gateway_url, shard.session().is_resumable()) {
        (Some(resume), true) => {
            let mut url = Url::parse(resume)?;
            url.set_query(gateway_url.query());
            url
        }
        _ => gateway_url.clone(),
    };

    log::info!("shard {}: connecting to {}", shard.id(), url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat: Option<Interval> = None;

    loop {
        tokio::select! {
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Err(ClientError::ConnectionClosed);
                };
                let actions = match frame? {
                    WsMessage::Text(text) => shard.handle_frame(text.as_str().as_bytes()),
                    WsMessage::Binary(bytes) => shard.handle_frame(&bytes),
                    WsMessage::Close(close) => {
                        let code = close.map(|c| u16::from(c.code)).unwrap_or(u16::from(CloseCode::Normal));
                        log::info!("shard {}: closed by server with code {}", shard.id(), code);
                        if is_fatal_close(code) {
                            return Err(ClientError::SessionRejected(code));
                        }
                        return Err(ClientError::ConnectionClosed);
                    }
                    _ => continue,
                };

                for action in actions {
                    match action {
                        ShardAction::Heartbeat { interval } => {
                            heartbeat = Some(tokio::time::interval_at(Instant::now() + interval, interval));
                            let hello_reply = match shard.resume(token) {
                                Some(resume) => resume,
                                None => shard.identify(token, intents),
                            };
                            send(&mut write, hello_reply).await?;
                        }
                        ShardAction::HeartbeatNow => send(&mut write, shard.heartbeat()).await?,
                        ShardAction::Reconnect => return Ok(()),
                        ShardAction::InvalidSession { resumable } => {
                            if !resumable {
                                shard.reset_session();
                            }
                            return Ok(());
                        }
                    }
                }
            }
            _ = tick(&mut heartbeat) => {
                send(&mut write, shard.heartbeat()).await?;
            }
            Some(payload) = outgoing.recv() => {
                send(&mut write, payload).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::event::EventKind;

    struct Quiet;

    #[async_trait]
    impl EventHandler for Quiet {}

    #[tokio::test]
    async fn handler_is_attached_once_however_often_start_runs() {
        let mut client = Client::builder("token").event_handler(Quiet).build().unwrap();
        assert!(EventKind::ALL.iter().all(|k| client.events().handler_count(*k) == 1));

        client.pending.clear();
        client.start().await.unwrap();
        client.start().await.unwrap();
        assert_eq!(client.events().handler_count(EventKind::Ready), 1);
        assert_eq!(client.events().handler_count(EventKind::MessageCreate), 1);
    }

    #[test]
    fn no_handler_means_no_subscribers() {
        let client = Client::builder("token").shard_count(2).build().unwrap();
        assert_eq!(client.events().handler_count(EventKind::Ready), 0);
        assert_eq!(client.pending.len(), 2);
    }
}
