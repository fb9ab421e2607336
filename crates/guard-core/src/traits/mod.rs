//! Collaborator traits consumed by the engine.

mod clock;
mod exchange;
mod notifier;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use exchange::ExchangeSource;
pub use notifier::{DeliveryAck, NotificationSink};
pub use store::StateStore;
