//! `flapboard` - a school shuttle departures board
//!
//! This library keeps the weekly trip schedule, renders it as a split-flap
//! board, and records per-trip attendance for secondary course groups. All
//! data lives in a local document store whose writes feed live queries, so
//! every open view refreshes itself.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod attendance;
pub mod auth;
pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod flap;
pub mod live;
pub mod logging;
pub mod model;
pub mod roster;
pub mod schedule;
pub mod store;
pub mod stylist;

pub use attendance::{AttendanceService, PresenceChange, PresenceOutcome};
pub use auth::{AuthGate, IdentityProvider, LocalIdentityProvider, User};
pub use board::{BoardRow, BoardView};
pub use config::Config;
pub use error::{ActionOutcome, Error, Result};
pub use filter::FilterCriteria;
pub use flap::{FlapAnimator, FlapCell, FlapDisplay, FlapState};
pub use logging::init_logging;
pub use roster::{CourseRoster, RosterService};
pub use schedule::ScheduleService;
pub use store::{DocumentStore, SqliteStore};
pub use stylist::{Stylist, TextGenerator};
