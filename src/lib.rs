//! # reserve-core
//!
//! Transaction and data lifecycle core of a cryptocurrency
//! reserve-management backend. It tracks every asynchronous on-chain
//! operation from submission to settlement, guarantees that a signed
//! transaction reaches the chain despite individual node failures, and
//! maintains a versioned, point-in-time-queryable history of the market
//! data that pricing decisions depend on.
//!
//! ## Architecture
//!
//! ```text
//! Exchange pollers, chain feeds, pricing
//!     │
//!     ├── SnapshotStore        (storage/)   versioned market data
//!     ├── ActivityLedger       (storage/)   pending -> settled operations
//!     ├── IntermediateTxCoordinator (service/)  two-phase deposit hops
//!     ├── RetentionJob         (service/)   export-then-prune auth data
//!     │
//!     ├── Rebroadcaster        (broadcast/) fan-out to all nodes
//!     │
//!     └── PostgreSQL / in-memory backends (storage/)
//! ```
//!
//! HTTP routing, exchange REST clients, and archive upload mechanics are
//! external collaborators; this crate exposes the storage and broadcast
//! seams they plug into.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
