//! Job-construction core for a stratum mining pool.
//!
//! Given a `getblocktemplate` response from a coin daemon, this crate builds
//! everything a miner needs to search for proof-of-work and everything the
//! pool needs to reassemble and submit a winning block:
//!
//! - [`algo`] — the proof-of-work algorithm registry: digest kernels keyed by
//!   identifier, each with its difficulty multiplier, hashed asynchronously on
//!   the blocking thread pool.
//! - [`coinbase`] — generation-transaction assembly, split at the extranonce
//!   insertion point, with reward splitting across pool, masternode,
//!   superblock, payee and fee-recipient outputs, merge-mining commitment and
//!   witness commitment.
//! - [`template`] — the per-round [`BlockTemplate`]: target/difficulty
//!   derivation, merkle branch, header and block serialization, submission
//!   replay guard, and the stratum job-parameter tuple.
//! - [`merkle`], [`difficulty`], [`wire`], [`rpc`] — the supporting pieces:
//!   branch/root computation, lossless difficulty arithmetic, the byte codec,
//!   and the serde model of the daemon template.
//!
//! One [`BlockTemplate`] is constructed per round of work; everything but its
//! submission set is immutable after construction, so templates are shared
//! freely across connection tasks.

pub mod algo;
pub mod coinbase;
pub mod difficulty;
pub mod merkle;
pub mod rpc;
pub mod template;
pub mod wire;

pub use algo::{AlgoError, AlgoRegistry, AlgorithmDescriptor, CoinTunables, HashError, PowHasher};
pub use coinbase::{AuxMerkleTree, CoinbaseError, GenerationTx, Recipient, RewardKind};
pub use difficulty::Difficulty;
pub use merkle::MerkleTree;
pub use rpc::RpcBlockTemplate;
pub use template::{BlockTemplate, JobParams, TemplateError};
