//! Lead pipeline board: per-owner stages, leads grouped into stage buckets,
//! and the engine that keeps the in-memory board in sync with storage.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────────┐  mutations   ┌──────────────────────────────────────────┐
//! │  cmd/*  or   │ ───────────> │  engine.rs  (SyncEngine, SyncState)      │
//! │  any viewer  │ <─────────── │    ├─ store.rs   (LeadStore, group_leads)│
//! └──────────────┘ BoardEvent / │    ├─ stages.rs  (StageRegistry)         │
//!                  snapshot()   │    └─ events.rs  (BoardEvent broadcast)  │
//!                               │         │                                │
//!                               │         │ PersistenceClient (client.rs)  │
//!                               │         v                                │
//!                               │  db.rs  (BoardDb, DbHandle over SQLite)  │
//!                               └──────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | `Stage`, `Lead`, patches, `StageColor`, `Interaction`   |
//! | `slug`     | `slugify`: stage name → stage key                       |
//! | `clock`    | `Clock` trait, `SystemClock`, `FixedClock` for tests    |
//! | `identity` | `IdentityProvider` trait, `StaticIdentity`              |

pub mod client;
pub mod clock;
pub mod db;
pub mod engine;
pub mod events;
pub mod identity;
pub mod models;
pub mod slug;
pub mod stages;
pub mod store;

pub use client::PersistenceClient;
pub use clock::{Clock, FixedClock, SystemClock};
pub use db::DbHandle;
pub use engine::{EngineOptions, SyncEngine, SyncState};
pub use events::BoardEvent;
pub use identity::{IdentityProvider, StaticIdentity};
pub use stages::{DEFAULT_STAGES, StageRegistry};
pub use store::LeadStore;
