// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod backoff;
pub mod config;
pub mod console;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod state;
pub mod test_support;
pub mod timer;
pub mod transport;

pub use config::{SessionConfig, SessionSettings};
pub use error::SessionError;
pub use protocol::{Command, EventKind, SessionEvent};
pub use router::HandlerId;
pub use session::{Dispatch, Session};
pub use state::{ConnectionState, ConnectionStats, StateChange};
