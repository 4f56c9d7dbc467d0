//! # ventry-proto
//!
//! Wire-format types for the Ventry realtime gateway.
//!
//! Every unit exchanged over a gateway connection is a JSON envelope with a
//! `type` discriminator. Inbound frames deserialize into [`frame::ClientFrame`];
//! outbound control frames serialize from [`envelope::ServerEnvelope`], and
//! collaborator-pushed application events from [`envelope::EventEnvelope`].

#![deny(unsafe_code)]

pub mod codes;
pub mod envelope;
pub mod frame;
