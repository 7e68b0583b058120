pub mod error;
pub mod events;
pub mod lock;
pub mod logging;
pub mod timestamp;

pub use error::{ConfigError, PlayerError, PlayerResult};
pub use events::{FnObserver, ObserverSet, PlayerEvent, PlayerObserver};
pub use logging::{ComponentLogger, LogContext};
pub use timestamp::*;
