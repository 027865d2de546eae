//! Serde model of the daemon's `getblocktemplate` response.
//!
//! Field names match the JSON the daemon emits, including the Dash-family
//! extensions (masternode and superblock payees, coinbase payload) and the
//! older payee/vote fields of node-payment coins. Required fields failing to
//! deserialize abort template construction; there is no partially valid
//! template.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlockTemplate {
    pub previousblockhash: String,

    pub height: u64,

    pub version: u32,

    pub curtime: u32,

    /// Compact target, hex. Passed through to miners verbatim.
    pub bits: String,

    /// Explicit 256-bit target, hex. Preferred over `bits` when present.
    #[serde(default)]
    pub target: Option<String>,

    pub coinbasevalue: u64,

    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,

    #[serde(default)]
    pub coinbaseaux: Option<CoinbaseAux>,

    /// Single payee object (Dash 0.12.1) or list (0.13+).
    #[serde(default)]
    pub masternode: Option<Masternode>,

    #[serde(default)]
    pub superblock: Vec<PayeeOutput>,

    /// Generic payee address of older node-payment coins.
    #[serde(default)]
    pub payee: Option<String>,

    #[serde(default)]
    pub payee_amount: Option<u64>,

    /// Gates vote data in the serialized block.
    #[serde(default)]
    pub masternode_payments: bool,

    /// Raw vote payloads, hex.
    #[serde(default)]
    pub votes: Vec<String>,

    /// Witness commitment output script, hex.
    #[serde(default)]
    pub default_witness_commitment: Option<String>,

    /// Extra payload for version-3 special transactions, hex.
    #[serde(default)]
    pub coinbase_payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    /// Raw transaction, hex.
    pub data: String,

    #[serde(default)]
    pub txid: Option<String>,

    #[serde(default)]
    pub hash: Option<String>,
}

impl RpcTransaction {
    /// Leaf identity for the merkle tree: txid when present, else hash.
    pub fn leaf_id(&self) -> Option<&str> {
        self.txid.as_deref().or(self.hash.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinbaseAux {
    /// Extra scriptSig bytes, hex.
    #[serde(default)]
    pub flags: Option<String>,
}

/// Masternode field: one payee object or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Masternode {
    Many(Vec<PayeeOutput>),
    Single(PayeeOutput),
}

/// A protocol-mandated payee: an address or a raw output script, plus the
/// amount the daemon says it must receive.
#[derive(Debug, Clone, Deserialize)]
pub struct PayeeOutput {
    #[serde(default)]
    pub payee: Option<String>,

    /// Raw output script, hex. Preferred over `payee` when present.
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub amount: u64,
}
