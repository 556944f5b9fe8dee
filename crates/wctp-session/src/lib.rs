//! Gateway login orchestration over the relay transport.
//!
//! Provides:
//! - Report routing from wire codes and event tags to `(channel, phase)` keys
//! - The login session aggregate and the eight-step bootstrap orchestrator
//! - A cancellable account poller started once both channels are logged in
//! - A single-task session driver and the handle the presentation layer uses

pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod router;
pub mod session;

pub use driver::{spawn_session_driver, SessionCommand, SessionDriver, SessionHandle};
pub use error::{SessionError, SessionResult};
pub use orchestrator::{LoginStart, Orchestrator, SessionConfig};
pub use poller::{AccountPoller, PollTick, QueryFn};
pub use router::{route, ChannelEvent, EventError, Routed};
pub use session::{LoginSession, OpRefs, SessionStatus};
