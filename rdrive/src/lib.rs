//! Folder synchronization tools - `rdrive` (device client) and `rdrived`
//! (sync server)
//!
//! Every user owns a single logical folder tree. The authoritative copy
//! lives on the server under `remotes/<user id>/`; each of the user's
//! devices runs `rdrive` against a local mirror. Changes made anywhere
//! propagate through the server to every other device, eventually
//! converging all mirrors.
//!
//! # Architecture
//!
//! ```text
//! Device A (rdrive)                  Server (rdrived)
//! ├── watcher ──> outbound queue      ├── registry: user -> state
//! └── driver ── TCP round ──────────> ├── authoritative folder
//!                                     └── pending queue per device
//! Device B (rdrive)                        │
//! └── driver ── TCP round <────────────────┘
//! ```
//!
//! The client runs two cooperating tasks: the [`watcher`] converts
//! filesystem events on the mirror into commands and appends them to the
//! outbound [`queue`]; the [`driver`] periodically opens a connection,
//! uploads a snapshot of the queue, applies whatever the peers produced in
//! the meantime and prunes the snapshot once the server acknowledges.
//!
//! The server performs exactly one round per accepted connection. All state
//! for a given user is serialised by that user's lock, so two devices of
//! the same user never interleave mid-round, while different users proceed
//! in parallel.
//!
//! Delivery is at-least-once: an interrupted round keeps the outbound queue
//! intact and the whole round is retried on the next tick. Replays are
//! absorbed by the idempotent command interpreter (final write wins,
//! deletes are absorbing).
//!
//! # Onboarding
//!
//! A brand-new device either registers a new user (uploading its folder as
//! the initial authoritative copy) or enrols as an additional device of an
//! existing user (downloading the authoritative copy first); see
//! [`enroll`].

pub mod driver;
pub mod enroll;
pub mod queue;
pub mod registry;
pub mod session;
pub mod watcher;
