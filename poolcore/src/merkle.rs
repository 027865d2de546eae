//! Merkle branch computation for work distribution.
//!
//! The tree is built over the non-coinbase transaction hashes only; the
//! coinbase occupies an implicit first slot. What gets cached is not the
//! finished tree but the `steps`: the intermediate branch hashes a remote
//! party needs to fold its own coinbase hash into the final root. Miners roll
//! extranonces, producing a fresh coinbase hash per attempt, and recompute the
//! root from the same steps every time.

use crate::wire::sha256d;

#[derive(Debug, Clone)]
pub struct MerkleTree {
    steps: Vec<[u8; 32]>,
}

impl MerkleTree {
    /// Build the branch steps for the given transaction hashes, in node order.
    pub fn new(leaves: Vec<[u8; 32]>) -> Self {
        let mut steps = Vec::new();
        let mut row = leaves;
        while !row.is_empty() {
            steps.push(row[0]);
            // Pair up the remainder; the placeholder slot stays in front.
            let rest = &row[1..];
            let mut next = Vec::with_capacity(rest.len() / 2 + 1);
            let mut i = 0;
            while i < rest.len() {
                let left = rest[i];
                let right = if i + 1 < rest.len() { rest[i + 1] } else { left };
                next.push(join(left, right));
                i += 2;
            }
            row = next;
        }
        Self { steps }
    }

    /// Branch hashes needed to recompute the root from a coinbase hash.
    pub fn steps(&self) -> &[[u8; 32]] {
        &self.steps
    }

    /// Fold `first` (the coinbase hash) through the steps, left to right.
    pub fn root_with(&self, first: [u8; 32]) -> [u8; 32] {
        self.steps.iter().fold(first, |acc, step| join(acc, *step))
    }

    /// Hex-encoded steps in transmission order.
    pub fn branch_hex(&self) -> Vec<String> {
        self.steps.iter().map(hex::encode).collect()
    }
}

fn join(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(&left);
    combined[32..].copy_from_slice(&right);
    sha256d(&combined)
}
