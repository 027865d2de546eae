//! Generation (coinbase) transaction assembly.
//!
//! The transaction is built in two halves split at the extranonce insertion
//! point inside the input scriptSig: miners send unique extranonces that join
//! `part1` and `part2` into a complete coinbase, giving every miner its own
//! search space without the pool re-serializing the transaction per share.
//!
//! Output order is fixed: witness commitment (when the template carries one),
//! the pool's own payout, then every protocol-mandated payee and configured
//! fee recipient. The pool output carries whatever remains of the block
//! reward after the other allocations; a template whose mandated payouts
//! exceed the reward is rejected outright.

use bytes::{BufMut, BytesMut};
use serde::Deserialize;
use thiserror::Error;

use crate::rpc::{Masternode, PayeeOutput, RpcBlockTemplate};
use crate::wire::{self, WireError};

/// Fixed signature serialized into every coinbase scriptSig.
const POOL_SIGNATURE: &str = "/poolcore/";

/// Tag introducing the aux-chain commitment in the scriptSig.
const MERGED_MINING_MAGIC: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];

/// Transaction type for coinbases carrying an extra payload (DIP2).
const SPECIAL_TX_COINBASE: u32 = 5;

#[derive(Debug, Error)]
pub enum CoinbaseError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("payee output carries neither script nor address")]
    PayeeWithoutScript,

    #[error("reward allocations ({allocated}) exceed coinbase value ({coinbase_value})")]
    RewardOvercommitted { coinbase_value: u64, allocated: u64 },
}

/// How the chain pays block rewards; POS coins get a timestamp in the
/// coinbase and a signature placeholder at the end of the block.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum RewardKind {
    Pow,
    Pos,
}

/// An operator-configured fee recipient, paid a fraction of the block reward.
#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    /// Fraction of the coinbase value, e.g. 0.01 for one percent.
    pub percent: f64,

    /// Output script, hex in configuration.
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
}

/// Commitment data for merge-mined auxiliary chains. The default (zero root,
/// no chains) is what pools without merged mining pass; the tag is emitted
/// either way.
#[derive(Debug, Clone, Default)]
pub struct AuxMerkleTree {
    pub root: [u8; 32],
    pub chain_ids: Vec<u32>,
}

/// The two coinbase halves, split at the extranonce insertion point.
#[derive(Debug, Clone)]
pub struct GenerationTx {
    pub part1: Vec<u8>,
    pub part2: Vec<u8>,
}

impl GenerationTx {
    /// Reassemble the full coinbase from miner-supplied extranonces.
    pub fn join(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.part1.len() + extranonce1.len() + extranonce2.len() + self.part2.len(),
        );
        out.extend_from_slice(&self.part1);
        out.extend_from_slice(extranonce1);
        out.extend_from_slice(extranonce2);
        out.extend_from_slice(&self.part2);
        out
    }
}

/// Build the generation transaction for one block template.
///
/// `script_sig_time` is the wall-clock time (unix seconds) stamped into the
/// scriptSig; the template passes the current time, tests pass fixtures.
#[allow(clippy::too_many_arguments)]
pub fn build_generation(
    rpc: &RpcBlockTemplate,
    pool_script: &[u8],
    extranonce_size: usize,
    reward: RewardKind,
    tx_comment: bool,
    recipients: &[Recipient],
    aux: &AuxMerkleTree,
    script_sig_time: u64,
) -> Result<GenerationTx, CoinbaseError> {
    let mut version: u32 = if tx_comment { 2 } else { 1 };
    let mut tx_type: u32 = 0;

    let extra_payload = match rpc.coinbase_payload.as_deref() {
        Some(payload) if !payload.is_empty() => {
            version = 3;
            tx_type = SPECIAL_TX_COINBASE;
            Some(wire::bytes_from_hex(payload, "coinbase_payload")?)
        }
        _ => None,
    };
    let packed_version = version | (tx_type << 16);

    // scriptSig prefix: height, optional aux flags, wall-clock time, the
    // extranonce push length, then the merge-mining tag.
    let mut prefix = BytesMut::new();
    prefix.extend_from_slice(&wire::script_number(rpc.height));
    if let Some(flags) = rpc.coinbaseaux.as_ref().and_then(|aux| aux.flags.as_deref()) {
        prefix.extend_from_slice(&wire::bytes_from_hex(flags, "coinbaseaux.flags")?);
    }
    prefix.extend_from_slice(&wire::script_number(script_sig_time));
    prefix.put_u8(extranonce_size as u8);
    prefix.extend_from_slice(&MERGED_MINING_MAGIC);
    prefix.extend_from_slice(&wire::reverse(&aux.root));
    prefix.put_u32_le(aux.chain_ids.len() as u32);
    prefix.put_u32_le(0); // merge-mining nonce

    let suffix = wire::var_string(POOL_SIGNATURE);

    let mut part1 = BytesMut::new();
    part1.put_u32_le(packed_version);
    if reward == RewardKind::Pos {
        part1.put_u32_le(rpc.curtime);
    }
    part1.extend_from_slice(&wire::var_int(1)); // input count
    part1.put_bytes(0, 32); // null previous output
    part1.put_u32_le(u32::MAX); // previous output index
    part1.extend_from_slice(&wire::var_int(
        (prefix.len() + extranonce_size + suffix.len()) as u64,
    ));
    part1.extend_from_slice(&prefix);

    let outputs = split_rewards(rpc, pool_script, recipients)?;

    let mut part2 = BytesMut::new();
    part2.extend_from_slice(&suffix);
    part2.put_u32_le(0); // input sequence
    part2.extend_from_slice(&serialize_outputs(&outputs));
    part2.put_u32_le(0); // lock time
    if tx_comment {
        part2.extend_from_slice(&wire::var_string(POOL_SIGNATURE));
    }
    if let Some(payload) = extra_payload {
        part2.extend_from_slice(&wire::var_bytes(&payload));
    }

    Ok(GenerationTx {
        part1: part1.to_vec(),
        part2: part2.to_vec(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TxOut {
    value: u64,
    script: Vec<u8>,
}

/// Split the block reward across every mandated payee and fee recipient.
///
/// Returns outputs in serialization order. The pool output value is whatever
/// remains; any allocation pattern that would drive it negative fails with
/// [`CoinbaseError::RewardOvercommitted`].
fn split_rewards(
    rpc: &RpcBlockTemplate,
    pool_script: &[u8],
    recipients: &[Recipient],
) -> Result<Vec<TxOut>, CoinbaseError> {
    let coinbase_value = rpc.coinbasevalue;
    // Shrinks as protocol payees take their cut; the generic-payee fallback
    // amount is computed against this running value.
    let mut remaining = coinbase_value;
    let mut outputs = Vec::new();

    match rpc.masternode.as_ref() {
        Some(Masternode::Single(payee)) if payee.payee.is_some() => {
            remaining = debit(remaining, payee.amount, coinbase_value)?;
            outputs.push(TxOut {
                value: payee.amount,
                script: payee_script(payee)?,
            });
        }
        Some(Masternode::Many(payees)) => {
            for payee in payees {
                remaining = debit(remaining, payee.amount, coinbase_value)?;
                outputs.push(TxOut {
                    value: payee.amount,
                    script: payee_script(payee)?,
                });
            }
        }
        _ => {}
    }

    for payee in &rpc.superblock {
        remaining = debit(remaining, payee.amount, coinbase_value)?;
        outputs.push(TxOut {
            value: payee.amount,
            script: payee_script(payee)?,
        });
    }

    if let Some(address) = rpc.payee.as_deref() {
        let amount = rpc.payee_amount.unwrap_or_else(|| remaining.div_ceil(5));
        remaining = debit(remaining, amount, coinbase_value)?;
        outputs.push(TxOut {
            value: amount,
            script: wire::address_to_script(address)?,
        });
    }

    // Fee recipients are cut from the pool's share, computed against the full
    // coinbase value.
    let mut pool_value = remaining;
    for recipient in recipients {
        let cut = (recipient.percent * coinbase_value as f64).floor() as u64;
        pool_value = debit(pool_value, cut, coinbase_value)?;
        outputs.push(TxOut {
            value: cut,
            script: recipient.script.clone(),
        });
    }

    outputs.insert(
        0,
        TxOut {
            value: pool_value,
            script: pool_script.to_vec(),
        },
    );

    if let Some(commitment) = rpc.default_witness_commitment.as_deref() {
        outputs.insert(
            0,
            TxOut {
                value: 0,
                script: wire::bytes_from_hex(commitment, "default_witness_commitment")?,
            },
        );
    }

    Ok(outputs)
}

fn debit(remaining: u64, amount: u64, coinbase_value: u64) -> Result<u64, CoinbaseError> {
    remaining
        .checked_sub(amount)
        .ok_or(CoinbaseError::RewardOvercommitted {
            coinbase_value,
            allocated: coinbase_value - remaining + amount,
        })
}

fn payee_script(payee: &PayeeOutput) -> Result<Vec<u8>, CoinbaseError> {
    if let Some(script) = payee.script.as_deref() {
        Ok(wire::bytes_from_hex(script, "payee script")?)
    } else if let Some(address) = payee.payee.as_deref() {
        Ok(wire::address_to_script(address)?)
    } else {
        Err(CoinbaseError::PayeeWithoutScript)
    }
}

fn serialize_outputs(outputs: &[TxOut]) -> Vec<u8> {
    let mut out = wire::var_int(outputs.len() as u64);
    for output in outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        out.extend_from_slice(&wire::var_int(output.script.len() as u64));
        out.extend_from_slice(&output.script);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GENESIS_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
    const POOL_SCRIPT: &[u8] = &[0x51]; // OP_TRUE placeholder script
    const EXTRANONCE_SIZE: usize = 8;
    const FIXED_TIME: u64 = 1_700_000_000;

    fn template(extra: serde_json::Value) -> RpcBlockTemplate {
        let mut base = json!({
            "previousblockhash":
                "000000000000000000025edb66bfe64ab3a320a16b243330ed6f52ed77c0eb13",
            "height": 875000,
            "version": 536870912u32,
            "curtime": 1_700_000_000u32,
            "bits": "1d00ffff",
            "coinbasevalue": 5_000_000_000u64,
            "transactions": []
        });
        base.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        serde_json::from_value(base).unwrap()
    }

    fn build(rpc: &RpcBlockTemplate, reward: RewardKind, tx_comment: bool) -> GenerationTx {
        build_generation(
            rpc,
            POOL_SCRIPT,
            EXTRANONCE_SIZE,
            reward,
            tx_comment,
            &[],
            &AuxMerkleTree::default(),
            FIXED_TIME,
        )
        .unwrap()
    }

    #[test]
    fn reward_split_allocates_remainder_to_pool() {
        let rpc = template(json!({
            "masternode": {"payee": GENESIS_ADDRESS, "amount": 1_000_000_000u64}
        }));
        let recipients = [
            Recipient {
                percent: 0.01,
                script: vec![0x52],
            },
            Recipient {
                percent: 0.02,
                script: vec![0x53],
            },
        ];

        let outputs = split_rewards(&rpc, POOL_SCRIPT, &recipients).unwrap();

        // Pool first, then masternode, then the two recipients.
        assert_eq!(outputs.len(), 4);
        assert_eq!(
            outputs[0].value,
            5_000_000_000 - 1_000_000_000 - 50_000_000 - 100_000_000
        );
        assert_eq!(outputs[0].value, 3_850_000_000);
        assert_eq!(outputs[1].value, 1_000_000_000);
        assert_eq!(outputs[2].value, 50_000_000);
        assert_eq!(outputs[3].value, 100_000_000);

        let total: u64 = outputs.iter().map(|o| o.value).sum();
        assert_eq!(total, rpc.coinbasevalue);
    }

    #[test]
    fn witness_commitment_comes_first_with_zero_value() {
        let rpc = template(json!({
            "default_witness_commitment":
                "6a24aa21a9ede2f61c3f71d1defd3fa999dfa36953755c690689799962b48bebd836974e8cf9"
        }));

        let outputs = split_rewards(&rpc, POOL_SCRIPT, &[]).unwrap();

        assert_eq!(outputs[0].value, 0);
        assert_eq!(outputs[0].script[0], 0x6a); // OP_RETURN
        assert_eq!(outputs[1].value, rpc.coinbasevalue);
        assert_eq!(outputs[1].script, POOL_SCRIPT);
    }

    #[test]
    fn generic_payee_defaults_to_fifth_of_remaining_reward() {
        let rpc = template(json!({ "payee": GENESIS_ADDRESS }));

        let outputs = split_rewards(&rpc, POOL_SCRIPT, &[]).unwrap();

        let fifth = 5_000_000_000u64.div_ceil(5);
        assert_eq!(outputs[1].value, fifth);
        assert_eq!(outputs[0].value, 5_000_000_000 - fifth);
    }

    #[test]
    fn overcommitted_template_is_rejected() {
        let rpc = template(json!({
            "masternode": {"payee": GENESIS_ADDRESS, "amount": 6_000_000_000u64}
        }));

        let err = split_rewards(&rpc, POOL_SCRIPT, &[]).unwrap_err();
        assert!(matches!(
            err,
            CoinbaseError::RewardOvercommitted {
                coinbase_value: 5_000_000_000,
                allocated: 6_000_000_000,
            }
        ));
    }

    #[test]
    fn masternode_list_prefers_raw_script() {
        let rpc = template(json!({
            "masternode": [
                {"script": "76a914000000000000000000000000000000000000000088ac",
                 "amount": 250_000_000u64},
                {"payee": GENESIS_ADDRESS, "amount": 250_000_000u64}
            ]
        }));

        let outputs = split_rewards(&rpc, POOL_SCRIPT, &[]).unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[1].script[3], 0x00);
        assert_eq!(
            hex::encode(&outputs[2].script),
            "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac"
        );
    }

    #[test]
    fn single_masternode_without_payee_is_skipped() {
        let rpc = template(json!({ "masternode": {"amount": 1_000u64} }));
        let outputs = split_rewards(&rpc, POOL_SCRIPT, &[]).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].value, rpc.coinbasevalue);
    }

    #[test]
    fn part1_layout_is_exact() {
        let rpc = template(json!({}));
        let generated = build(&rpc, RewardKind::Pow, false);
        let p1 = &generated.part1;

        // Version 1, no type bits.
        assert_eq!(&p1[0..4], &1u32.to_le_bytes());
        // One input, null previous output, max index.
        assert_eq!(p1[4], 1);
        assert_eq!(&p1[5..37], &[0u8; 32]);
        assert_eq!(&p1[37..41], &[0xff; 4]);

        // Declared scriptSig length covers prefix + extranonce + suffix.
        let declared = p1[41] as usize;
        let prefix_len = p1.len() - 42;
        let suffix_len = 1 + POOL_SIGNATURE.len();
        assert_eq!(declared, prefix_len + EXTRANONCE_SIZE + suffix_len);

        // The prefix ends with the merge-mining tag: magic, reversed zero
        // root, zero chain count, zero nonce.
        let tag = &p1[p1.len() - 44..];
        assert_eq!(&tag[0..4], &MERGED_MINING_MAGIC);
        assert_eq!(&tag[4..36], &[0u8; 32]);
        assert_eq!(&tag[36..44], &[0u8; 8]);

        // Extranonce push length byte sits just before the tag.
        assert_eq!(p1[p1.len() - 45], EXTRANONCE_SIZE as u8);
    }

    #[test]
    fn part2_ends_with_sequence_outputs_and_locktime() {
        let rpc = template(json!({}));
        let generated = build(&rpc, RewardKind::Pow, false);
        let p2 = &generated.part2;

        // Leads with the suffix: length-prefixed pool signature.
        assert_eq!(p2[0] as usize, POOL_SIGNATURE.len());
        assert_eq!(&p2[1..1 + POOL_SIGNATURE.len()], POOL_SIGNATURE.as_bytes());

        // Sequence number zero follows the suffix.
        let seq_at = 1 + POOL_SIGNATURE.len();
        assert_eq!(&p2[seq_at..seq_at + 4], &0u32.to_le_bytes());

        // Single pool output carrying the whole reward.
        let count_at = seq_at + 4;
        assert_eq!(p2[count_at], 1);
        assert_eq!(
            &p2[count_at + 1..count_at + 9],
            &5_000_000_000u64.to_le_bytes()
        );

        // Lock time zero closes the transaction.
        assert_eq!(&p2[p2.len() - 4..], &0u32.to_le_bytes());
    }

    #[test]
    fn pos_reward_inserts_timestamp() {
        let rpc = template(json!({}));
        let pow = build(&rpc, RewardKind::Pow, false);
        let pos = build(&rpc, RewardKind::Pos, false);

        assert_eq!(pos.part1.len(), pow.part1.len() + 4);
        assert_eq!(&pos.part1[4..8], &rpc.curtime.to_le_bytes());
    }

    #[test]
    fn tx_comment_bumps_version_and_appends_comment() {
        let rpc = template(json!({}));
        let with_comment = build(&rpc, RewardKind::Pow, true);

        assert_eq!(&with_comment.part1[0..4], &2u32.to_le_bytes());

        let comment = wire::var_string(POOL_SIGNATURE);
        let tail_start = with_comment.part2.len() - comment.len();
        assert_eq!(&with_comment.part2[tail_start..], &comment[..]);
    }

    #[test]
    fn coinbase_payload_switches_to_special_transaction() {
        let rpc = template(json!({ "coinbase_payload": "0200aabb" }));
        let generated = build(&rpc, RewardKind::Pow, false);

        // Version 3 with type 5 packed into the high half.
        let expected = 3u32 | (5 << 16);
        assert_eq!(&generated.part1[0..4], &expected.to_le_bytes());

        // Payload is varint-framed at the very end of part2.
        let p2 = &generated.part2;
        assert_eq!(&p2[p2.len() - 5..], &[0x04, 0x02, 0x00, 0xaa, 0xbb]);
    }

    #[test]
    fn aux_tree_is_committed_in_the_prefix() {
        let rpc = template(json!({}));
        let aux = AuxMerkleTree {
            root: [0xab; 32],
            chain_ids: vec![1, 7],
        };
        let generated = build_generation(
            &rpc,
            POOL_SCRIPT,
            EXTRANONCE_SIZE,
            RewardKind::Pow,
            false,
            &[],
            &aux,
            FIXED_TIME,
        )
        .unwrap();

        let p1 = &generated.part1;
        let tag = &p1[p1.len() - 44..];
        assert_eq!(&tag[0..4], &MERGED_MINING_MAGIC);
        assert_eq!(&tag[4..36], &[0xab; 32]);
        assert_eq!(&tag[36..40], &2u32.to_le_bytes());
        assert_eq!(&tag[40..44], &0u32.to_le_bytes());
    }

    #[test]
    fn join_places_extranonces_at_the_split() {
        let rpc = template(json!({}));
        let generated = build(&rpc, RewardKind::Pow, false);

        let en1 = [0x01, 0x02, 0x03, 0x04];
        let en2 = [0x05, 0x06, 0x07, 0x08];
        let coinbase = generated.join(&en1, &en2);

        assert_eq!(
            coinbase.len(),
            generated.part1.len() + 8 + generated.part2.len()
        );
        let split = generated.part1.len();
        assert_eq!(&coinbase[split..split + 4], &en1);
        assert_eq!(&coinbase[split + 4..split + 8], &en2);
    }

    #[test]
    fn reward_kind_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(RewardKind::from_str("POS").unwrap(), RewardKind::Pos);
        assert_eq!(RewardKind::from_str("pow").unwrap(), RewardKind::Pow);
        assert!(RewardKind::from_str("merge").is_err());
    }
}
