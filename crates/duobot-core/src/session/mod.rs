//! Conversation session management
//!
//! Per-participant sessions hold a bounded window of recent turns and are
//! evicted after a period of inactivity. Sessions are kept in memory only.
//! Worst-case memory is proportional to the number of distinct participants
//! active within one idle timeout plus one sweep interval.

mod clock;
mod facade;
mod store;
mod sweeper;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use facade::{ClearStatus, SessionFacade, DEFAULT_FALLBACK_REPLY, EMPTY_MESSAGE_REPLY};
pub use store::SessionStore;
pub use sweeper::{SessionSweeper, SweepReport, SweeperHandle};
pub use types::{Role, Session, Turn};
