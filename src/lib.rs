pub mod bus;
pub mod cache;
pub mod client;
pub mod error;
pub mod event;
pub mod http;
pub mod model;
pub mod ring_buffer;
pub mod router;
pub mod shard;
pub mod voice;

pub mod prelude {
    pub use crate::bus::{EventBus, SubscriptionToken};
    pub use crate::cache::{Cache, CacheConfig};
    pub use crate::client::{Client, ClientBuilder, Context};
    pub use crate::error::{CacheError, ClientError, FrameError, HandlerError};
    pub use crate::event::{Event, EventHandler, EventKind};
    pub use crate::model::*;
    pub use crate::router::GatewayEventRouter;
    pub use crate::voice::{NegotiationStep, VoiceNegotiation};
}
