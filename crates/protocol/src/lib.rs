//! # OCR Protocol
//!
//! Byzantine fault tolerant offchain reporting: a committee of `N` oracles,
//! at most `F` of them faulty, agrees on signed reports and gets them
//! transmitted on chain.
//!
//! ## Protocol Flow
//!
//! ```text
//! Epoch e, leader l = leader(e):
//!
//! ┌──────────────┐
//! │   PACEMAKER  │  NewEpoch(e') from >2F oracles  =>  move to e'
//! │              │  no progress within delta_progress => ask for e+1
//! └──────┬───────┘
//!        │ spawns one instance per epoch
//!        ▼
//! ┌──────────────┐
//! │  REPORT GEN  │  leader:   ObserveReq{q}  ──►  all
//! │  round r     │  follower: Observe{signed obs}  ──►  leader
//! │              │  leader:   ReportReq{q, ≥2F+1 obs}  ──►  all
//! │              │  follower: Report{signed report | skip}  ──►  leader
//! │              │  leader:   Final{quorum-signed report}  ──►  all
//! └──────┬───────┘
//!        │ EventFinal
//!        ▼
//! ┌──────────────┐
//! │ FINALIZATION │  dedupe, expire, verify quorum
//! │              │  broadcast FinalEcho
//! └──────┬───────┘
//!        │ EventTransmit
//!        ▼
//! ┌──────────────┐
//! │ TRANSMISSION │  stage = position in keyed permutation of 0..N
//! │              │  at now + stage * delta_stage: should_transmit? transmit
//! └──────────────┘
//! ```
//!
//! ## Safety Guarantees
//!
//! **Agreement**: an honest follower signs at most one report per
//! `(epoch, round)`, so two distinct reports can never both gather the
//! unique-reports quorum `⌊(N+F)/2⌋+1`.
//!
//! **Liveness**: with more than `2F` honest oracles online, a faulty leader
//! is replaced within `delta_progress`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ocr_protocol::{Oracle, OracleArgs};
//! use tokio_util::sync::CancellationToken;
//!
//! let oracle = Oracle::new(args)?;
//! let handle = oracle.spawn(CancellationToken::new());
//! // ...
//! handle.shutdown().await;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod attested_report;
mod context;
pub mod domains;
pub mod error;
pub mod events;
pub mod heap;
pub mod leader_selection;
pub mod messages;
pub mod oracle;
pub mod pacemaker;
pub mod persistence;
pub mod report_finalization;
pub mod report_generation;
pub mod schedule;
pub mod sender;
pub mod taper;
pub mod timed;
pub mod transmission;

#[cfg(test)]
mod test_support;

pub use attested_report::{
    AttestationError, AttestedReportMany, AttestedReportOne, AttributedSignedObservation,
    SignedObservation,
};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{EventToPacemaker, FinalizedReport};
pub use heap::{ScheduledTransmission, TransmissionHeap};
pub use leader_selection::{KeyedLeaderSelector, LeaderSelector, RoundRobinLeaderSelector};
pub use messages::ProtocolMessage;
pub use oracle::{Oracle, OracleArgs, OracleHandle};
pub use report_finalization::{expiration_age_rounds, FinalizeOutcome};
pub use report_generation::compute_extra_hash;
pub use schedule::{transmission_delay, transmission_order};
pub use sender::MessageSender;
pub use taper::Taper;
pub use timed::timed_call;
