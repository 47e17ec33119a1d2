//! Agent orchestration: sessions, run driving, tool dispatch, mint guard
//!
//! # Architecture
//!
//! ```text
//! MintService
//!     │
//!     ▼
//! SessionManager.open(task) ─► Session ─► start_run ─► Run
//!                                                       │
//!                                                       ▼
//!                                      RunDriver.perform_run(session, run)
//!                                                       │
//!                                    requires_action    │
//!                                          ▼            │
//!                          ToolDispatcher.dispatch_batch(calls, &mut MintState)
//!                                          │
//!                            guard::should_block ─► block payload
//!                                          │
//!                                   ToolHandler::call
//! ```

pub mod controller;
pub mod dispatcher;
pub mod guard;
pub mod sessions;

pub use controller::{DriverConfig, DriverError, RunDriver, RunResult};
pub use dispatcher::{BatchOutcome, CallOutcome, DispatchRecord, RunReport, ToolDispatcher};
pub use guard::{MintState, MINTING_ALREADY_COMPLETED};
pub use sessions::{Session, SessionError, SessionManager};
