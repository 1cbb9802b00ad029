//! # Core Navigation Logic
//!
//! This module decides what a fragment change means.
//! It knows nothing about any specific location backend or store.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • hash (grammar)       │
//!                    │  • filter (intercept)   │
//!                    │  • router (classify)    │
//!                    │  • events (broadcast)   │
//!                    │  • compaction (async)   │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │  Location  │      │  KeyValue  │      │ Listeners  │
//!     │ (memory,   │      │   Store    │      │ & filters  │
//!     │  browser)  │      │            │      │            │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`hash`]: fragment ⇄ `StructuredHash`
//! - [`filter`]: the navigation filter chain
//! - [`state`]: `NavigationState` and `Classification`
//! - [`events`]: event catalog, typed events, listener registry
//! - [`router`]: `ShellNavigation`, the classifier and write path
//! - [`compaction`]: parameter compaction and expansion
//! - [`config`]: settings and their override hierarchy

pub mod compaction;
pub mod config;
pub mod events;
pub mod filter;
pub mod hash;
pub mod router;
pub mod state;

pub use router::ShellNavigation;
