//! Block template: one mining round's job state.
//!
//! A template is constructed once per `getblocktemplate` round. Target,
//! difficulty, merkle branch and the generation transaction are derived at
//! construction and never mutated, so concurrent readers need no
//! synchronization; the only mutable state is the submission-replay guard.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::pow::{CompactTarget, Target};
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::coinbase::{self, AuxMerkleTree, CoinbaseError, GenerationTx, Recipient, RewardKind};
use crate::difficulty::Difficulty;
use crate::merkle::MerkleTree;
use crate::rpc::RpcBlockTemplate;
use crate::wire::{self, WireError};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Coinbase(#[from] CoinbaseError),

    #[error("invalid compact bits: {0:?}")]
    InvalidBits(String),

    #[error("transaction {index} carries neither txid nor hash")]
    TransactionWithoutId { index: usize },
}

/// The mining.notify parameter tuple, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub job_id: String,
    pub prev_hash: String,
    pub coinbase1: String,
    pub coinbase2: String,
    pub merkle_branch: Vec<String>,
    pub version: String,
    pub bits: String,
    pub time: String,
    pub clean_jobs: bool,
}

impl JobParams {
    /// Parameters as the stratum notification array.
    pub fn to_stratum_json(&self) -> Value {
        json!([
            self.job_id,
            self.prev_hash,
            self.coinbase1,
            self.coinbase2,
            self.merkle_branch,
            self.version,
            self.bits,
            self.time,
            self.clean_jobs,
        ])
    }
}

pub struct BlockTemplate {
    job_id: String,
    rpc: RpcBlockTemplate,
    reward: RewardKind,
    target: Target,
    difficulty: Difficulty,
    bits: u32,
    prev_hash_raw: [u8; 32],
    prev_hash_reversed: String,
    transaction_data: Vec<u8>,
    merkle: MerkleTree,
    merkle_branch: Vec<String>,
    generation: GenerationTx,
    vote_data: Vec<u8>,
    submits: Mutex<HashSet<String>>,
    job_params: OnceLock<JobParams>,
}

impl BlockTemplate {
    /// Build the template for one round of work.
    ///
    /// Fails on any malformed hex, unparsable target/bits, or a reward split
    /// the coinbase value cannot cover; there is no partially valid template.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: impl Into<String>,
        rpc: RpcBlockTemplate,
        pool_script: &[u8],
        extranonce_size: usize,
        reward: RewardKind,
        tx_comment: bool,
        recipients: &[Recipient],
        aux: &AuxMerkleTree,
    ) -> Result<Self, TemplateError> {
        let job_id = job_id.into();

        let bits = u32::from_str_radix(&rpc.bits, 16)
            .map_err(|_| TemplateError::InvalidBits(rpc.bits.clone()))?;
        let target = match rpc.target.as_deref() {
            Some(explicit) => Target::from_be_bytes(wire::hash32(explicit, "target")?),
            None => Target::from_compact(CompactTarget::from_consensus(bits)),
        };
        let difficulty = Difficulty::from_target(target);

        let prev_hash_raw = wire::hash32(&rpc.previousblockhash, "previousblockhash")?;
        let prev_hash_reversed = hex::encode(wire::reverse_u32_words(&prev_hash_raw));

        let mut transaction_data = Vec::new();
        let mut leaves = Vec::with_capacity(rpc.transactions.len());
        for (index, tx) in rpc.transactions.iter().enumerate() {
            transaction_data.extend_from_slice(&wire::bytes_from_hex(&tx.data, "transaction data")?);
            let id = tx
                .leaf_id()
                .ok_or(TemplateError::TransactionWithoutId { index })?;
            leaves.push(wire::reversed_hash32(id, "transaction id")?);
        }
        let merkle = MerkleTree::new(leaves);
        let merkle_branch = merkle.branch_hex();

        let vote_data = if rpc.masternode_payments {
            let mut data = wire::var_int(rpc.votes.len() as u64);
            for vote in &rpc.votes {
                data.extend_from_slice(&wire::bytes_from_hex(vote, "vote")?);
            }
            data
        } else {
            Vec::new()
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let generation = coinbase::build_generation(
            &rpc,
            pool_script,
            extranonce_size,
            reward,
            tx_comment,
            recipients,
            aux,
            now,
        )?;

        debug!(
            job_id = %job_id,
            height = rpc.height,
            difficulty = %difficulty,
            txs = rpc.transactions.len(),
            "built block template"
        );

        Ok(Self {
            job_id,
            rpc,
            reward,
            target,
            difficulty,
            bits,
            prev_hash_raw,
            prev_hash_reversed,
            transaction_data,
            merkle,
            merkle_branch,
            generation,
            vote_data,
            submits: Mutex::new(HashSet::new()),
            job_params: OnceLock::new(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn rpc(&self) -> &RpcBlockTemplate {
        &self.rpc
    }

    /// 256-bit proof-of-work target for this round.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Base network difficulty (scale by the algorithm multiplier for
    /// external reporting).
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Previous block hash in stratum presentation order, hex.
    pub fn prev_hash_reversed(&self) -> &str {
        &self.prev_hash_reversed
    }

    pub fn generation(&self) -> &GenerationTx {
        &self.generation
    }

    pub fn merkle_branch(&self) -> &[String] {
        &self.merkle_branch
    }

    /// Concatenated raw transactions, coinbase excluded.
    pub fn transaction_data(&self) -> &[u8] {
        &self.transaction_data
    }

    /// Full coinbase for one miner's extranonces.
    pub fn serialize_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        self.generation.join(extranonce1, extranonce2)
    }

    /// Merkle root for a reassembled coinbase: hash it, then fold through the
    /// cached branch steps.
    pub fn merkle_root_for(&self, coinbase: &[u8]) -> [u8; 32] {
        self.merkle.root_with(wire::sha256d(coinbase))
    }

    /// Serialize the 80-byte block header.
    ///
    /// Fields are written big-endian at fixed offsets (nonce 0, bits 4, time
    /// 8, merkle root 12, previous hash 44, version 76) and the whole buffer
    /// is then reversed end to end, reproducing the Bitcoin wire header
    /// exactly. Pure: identical inputs always yield identical bytes.
    pub fn serialize_header(&self, merkle_root: &[u8; 32], ntime: u32, nonce: u32) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[0..4].copy_from_slice(&nonce.to_be_bytes());
        header[4..8].copy_from_slice(&self.bits.to_be_bytes());
        header[8..12].copy_from_slice(&ntime.to_be_bytes());
        header[12..44].copy_from_slice(merkle_root);
        header[44..76].copy_from_slice(&self.prev_hash_raw);
        header[76..80].copy_from_slice(&self.rpc.version.to_be_bytes());
        header.reverse();
        header
    }

    /// Serialize the complete block for daemon submission.
    ///
    /// POS coins get a trailing zero byte the daemon replaces with its block
    /// signature; node-payment coins get their vote data after the
    /// transactions.
    pub fn serialize_block(&self, header: &[u8; 80], coinbase: &[u8]) -> Vec<u8> {
        let tx_count = wire::var_int(self.rpc.transactions.len() as u64 + 1);
        let mut block = Vec::with_capacity(
            80 + tx_count.len()
                + coinbase.len()
                + self.transaction_data.len()
                + self.vote_data.len()
                + 1,
        );
        block.extend_from_slice(header);
        block.extend_from_slice(&tx_count);
        block.extend_from_slice(coinbase);
        block.extend_from_slice(&self.transaction_data);
        block.extend_from_slice(&self.vote_data);
        if self.reward == RewardKind::Pos {
            block.push(0);
        }
        block
    }

    /// Record a share submission, returning whether it is the first time this
    /// tuple has been seen for this template.
    ///
    /// Check-and-insert is atomic under the lock, so concurrent duplicates
    /// cannot both observe "not seen".
    pub fn register_submit(
        &self,
        extranonce1: &str,
        extranonce2: &str,
        ntime: &str,
        nonce: &str,
    ) -> bool {
        let mut key = String::with_capacity(
            extranonce1.len() + extranonce2.len() + ntime.len() + nonce.len(),
        );
        key.push_str(extranonce1);
        key.push_str(extranonce2);
        key.push_str(ntime);
        key.push_str(nonce);

        let fresh = self.submits.lock().insert(key);
        if !fresh {
            debug!(job_id = %self.job_id, "duplicate share submission");
        }
        fresh
    }

    /// The notification tuple for this job, computed once and cached.
    pub fn job_params(&self) -> &JobParams {
        self.job_params.get_or_init(|| JobParams {
            job_id: self.job_id.clone(),
            prev_hash: self.prev_hash_reversed.clone(),
            coinbase1: hex::encode(&self.generation.part1),
            coinbase2: hex::encode(&self.generation.part2),
            merkle_branch: self.merkle_branch.clone(),
            version: format!("{:08x}", self.rpc.version),
            bits: self.rpc.bits.clone(),
            time: format!("{:08x}", self.rpc.curtime),
            clean_jobs: true,
        })
    }
}
