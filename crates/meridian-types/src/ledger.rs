//! Ledger shapes served over RPC: transactions, blocks, balances and the
//! leader-election proof carried in every block.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{AccountAddress, BlockHash, SignedEnvelope, Timestamped};

/// Output of a verifiable random function together with its proof.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableRandomness {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub output: Vec<u8>,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub proof: Vec<u8>,
}

/// Proof that the block proposer won single-secret leader election for a slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderElectionProof {
    pub slot_number: u64,
    pub previous_block_hash: BlockHash,
    pub randomness: VerifiableRandomness,
}

impl LeaderElectionProof {
    /// The VRF input for a slot: a fixed template over slot and previous hash.
    pub fn seed_message(slot_number: u64, previous_block_hash: &BlockHash) -> Vec<u8> {
        format!(
            "meridian-leader-election:slot={slot_number}:prev={}",
            previous_block_hash.to_hex()
        )
        .into_bytes()
    }

    pub fn message(&self) -> Vec<u8> {
        Self::seed_message(self.slot_number, &self.previous_block_hash)
    }
}

/// What a transaction does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer { to: AccountAddress, amount: u64 },
    Stake { amount: u64 },
    Unstake { amount: u64 },
}

/// Payload of a signed transaction. The sender is the envelope's signer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub nonce: u64,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub kind: TransactionKind,
}

impl Timestamped for TransactionPayload {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Payload of a signed block. The proposer is the envelope's signer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub slot_number: u64,
    pub previous_block_hash: BlockHash,
    pub leader_proof: LeaderElectionProof,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub transactions: Vec<SignedEnvelope>,
}

impl Timestamped for BlockPayload {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Balance and stake held by an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub address: AccountAddress,
    pub balance: u64,
    pub stake: u64,
}
