//! # Draw-and-Guess Game Server
//!
//! This library implements the authoritative server for the multi-room
//! draw-and-guess game. Clients connect over TCP for the control stream and
//! send stroke datagrams over UDP on the same port number; the server
//! arbitrates room membership, game phases, turn assignment, stroke fan-out,
//! guess adjudication, and the per-round AI scoring call.
//!
//! ## Architecture
//!
//! All state lives in two registries guarded by async mutexes: the client
//! registry (identity, endpoints, outbound queues) and the room registry
//! (membership, the embedded game machine, stroke history, the parked AI
//! result). The lock order is always clients before rooms, and neither lock
//! is held across socket I/O; outbound frames travel through per-client
//! queues drained by session writer tasks.
//!
//! A round walks WAITING -> READY -> PAINTING -> GUESSING -> FINISHED and
//! snaps back to WAITING with membership intact. Two deadlines bound it: 60
//! seconds of painting and 30 seconds of guessing, driven by a one-second
//! ticker when the corresponding messages do not arrive first. The AI
//! scoring call is scheduled once per round at the PAINTING to GUESSING
//! transition; its verdict is parked in the room and released only after the
//! round's GAME_END broadcast.
//!
//! ## Module organization
//!
//! - [`client_manager`]: fixed-slot client registry and outbound queues
//! - [`room`]: room registry and the per-room game state machine
//! - [`engine`]: message handlers, transitions, broadcasts, AI scheduling
//! - [`session`]: framed reader loop and writer task per TCP connection
//! - [`network`]: TCP accept loop and UDP stroke dispatcher
//! - [`timer`]: one-second deadline ticker
//! - [`repo`]: SQLite word dictionary, game history, stroke telemetry
//! - [`ai`]: length-prefixed JSON client for the scoring service

pub mod ai;
pub mod client_manager;
pub mod engine;
pub mod network;
pub mod repo;
pub mod room;
pub mod session;
pub mod timer;
