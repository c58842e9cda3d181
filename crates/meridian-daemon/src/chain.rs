//! In-memory chain store.
//!
//! Holds genesis balances, verified transactions, and blocks whose leader
//! proof checks out. Transactions are indexed and pooled but never applied:
//! balances and stakes stay at their genesis values.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use meridian_auth::{AuthError, AuthenticatedMessageService, FreshnessPolicy, ReplayCache};
use meridian_crypto::blake3;
use meridian_crypto::vrf::VrfVerifier;
use meridian_negotiation::StakeLedger;
use meridian_transport::{cbor, envelope};
use meridian_types::{
    tags, AccountAddress, AccountBalance, BlockHash, BlockPayload, SignedEnvelope,
    TransactionPayload, TxHash, WireEnvelope, Word256,
};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("block does not extend the tip: {0}")]
    NotExtendingTip(String),

    #[error("invalid leader proof: {0}")]
    InvalidLeaderProof(String),

    #[error("invalid transaction in block: {0}")]
    InvalidTransaction(String),

    #[error("already known: {0}")]
    Duplicate(Word256),

    #[error("mempool full ({capacity} transactions)")]
    MempoolFull { capacity: usize },
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// A block accepted onto the chain.
#[derive(Clone, Debug, Serialize)]
pub struct StoredBlock {
    pub hash: BlockHash,
    pub height: u64,
    pub envelope: SignedEnvelope,
    pub payload: BlockPayload,
}

/// A verified transaction, pooled or included in a block.
#[derive(Clone, Debug, Serialize)]
pub struct StoredTransaction {
    pub hash: TxHash,
    pub envelope: SignedEnvelope,
    pub payload: TransactionPayload,
    /// Height of the including block; `None` while in the mempool.
    pub block_height: Option<u64>,
}

#[derive(Default)]
struct ChainState {
    accounts: HashMap<AccountAddress, AccountBalance>,
    blocks: Vec<StoredBlock>,
    by_hash: HashMap<BlockHash, usize>,
    transactions: HashMap<TxHash, StoredTransaction>,
    mempool: HashSet<TxHash>,
}

pub struct ChainStore {
    auth: AuthenticatedMessageService,
    vrf: Arc<dyn VrfVerifier>,
    max_clock_skew: Duration,
    mempool_capacity: usize,
    replay: Mutex<ReplayCache>,
    state: Mutex<ChainState>,
}

/// Hash of an envelope's canonical bytes.
pub fn envelope_hash(signed: &SignedEnvelope) -> Word256 {
    Word256::from_bytes(&blake3::hash(&envelope::encode(
        &signed.type_tag,
        &signed.payload,
    )))
}

impl ChainStore {
    pub fn new(
        auth: AuthenticatedMessageService,
        vrf: Arc<dyn VrfVerifier>,
        max_clock_skew: Duration,
        mempool_capacity: usize,
        genesis: impl IntoIterator<Item = AccountBalance>,
    ) -> Self {
        let accounts: HashMap<_, _> = genesis.into_iter().map(|a| (a.address, a)).collect();
        info!(accounts = accounts.len(), mempool_capacity, "chain store initialised");
        Self {
            auth,
            vrf,
            max_clock_skew,
            mempool_capacity,
            replay: Mutex::new(ReplayCache::with_retention(max_clock_skew)),
            state: Mutex::new(ChainState {
                accounts,
                ..ChainState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn balance(&self, address: &AccountAddress) -> AccountBalance {
        self.state()
            .accounts
            .get(address)
            .cloned()
            .unwrap_or_else(|| AccountBalance {
                address: *address,
                ..AccountBalance::default()
            })
    }

    /// Height of the tip, `None` before the first block.
    pub fn height(&self) -> Option<u64> {
        self.state().blocks.last().map(|b| b.height)
    }

    /// Hash of the tip, zero before the first block.
    pub fn tip_hash(&self) -> BlockHash {
        self.state()
            .blocks
            .last()
            .map_or(Word256::ZERO, |b| b.hash)
    }

    pub fn block_by_hash(&self, hash: &BlockHash) -> Option<StoredBlock> {
        let state = self.state();
        state.by_hash.get(hash).map(|i| state.blocks[*i].clone())
    }

    pub fn block_at(&self, height: u64) -> Option<StoredBlock> {
        let index = usize::try_from(height).ok()?;
        self.state().blocks.get(index).cloned()
    }

    pub fn transaction(&self, hash: &TxHash) -> Option<StoredTransaction> {
        self.state().transactions.get(hash).cloned()
    }

    pub fn mempool_len(&self) -> usize {
        self.state().mempool.len()
    }

    fn policy(&self, tag: &str) -> FreshnessPolicy {
        FreshnessPolicy::new(tag, self.max_clock_skew)
    }

    fn ensure_mempool_room(&self, state: &ChainState) -> Result<()> {
        if state.mempool.len() >= self.mempool_capacity {
            warn!(capacity = self.mempool_capacity, "mempool full, refusing transaction");
            return Err(ChainError::MempoolFull {
                capacity: self.mempool_capacity,
            });
        }
        Ok(())
    }

    /// Verify and pool a signed transaction.
    ///
    /// A full mempool refuses the transaction before it is verified, so its
    /// triple is not spent and it can be resubmitted later.
    pub fn submit_transaction(&self, wire: &WireEnvelope) -> Result<TxHash> {
        self.ensure_mempool_room(&self.state())?;
        let (signed, payload): (SignedEnvelope, TransactionPayload) =
            self.auth
                .verify_fresh_wire(wire, &self.policy(tags::TRANSACTION), &self.replay)?;
        let hash = envelope_hash(&signed);

        let mut state = self.state();
        if state.transactions.contains_key(&hash) {
            return Err(ChainError::Duplicate(hash));
        }
        self.ensure_mempool_room(&state)?;
        state.transactions.insert(
            hash,
            StoredTransaction {
                hash,
                envelope: signed.clone(),
                payload,
                block_height: None,
            },
        );
        state.mempool.insert(hash);
        debug!(tx = %hash, sender = %signed.signer().short(), "transaction pooled");
        Ok(hash)
    }

    /// Verify a signed block and append it to the chain.
    ///
    /// The block must extend the tip, carry a leader proof for its own slot
    /// and previous hash, and that proof must verify under the signer's key.
    pub fn submit_block(&self, wire: &WireEnvelope) -> Result<(BlockHash, u64)> {
        let (signed, payload): (SignedEnvelope, BlockPayload) =
            self.auth
                .verify_fresh_wire(wire, &self.policy(tags::BLOCK), &self.replay)?;
        self.verify_leader_proof(&signed, &payload)?;
        let included = self.verify_transactions(&payload)?;
        let hash = envelope_hash(&signed);

        let mut state = self.state();
        let (tip_hash, tip_slot) = state
            .blocks
            .last()
            .map_or((Word256::ZERO, None), |b| (b.hash, Some(b.payload.slot_number)));
        if payload.previous_block_hash != tip_hash {
            return Err(ChainError::NotExtendingTip(format!(
                "previous hash {} but tip is {}",
                payload.previous_block_hash, tip_hash
            )));
        }
        if tip_slot.is_some_and(|slot| payload.slot_number <= slot) {
            return Err(ChainError::NotExtendingTip(format!(
                "slot {} not after tip slot {:?}",
                payload.slot_number, tip_slot
            )));
        }

        let height = state.blocks.len() as u64;
        for (tx_hash, tx) in included {
            state.mempool.remove(&tx_hash);
            state.transactions.insert(
                tx_hash,
                StoredTransaction {
                    block_height: Some(height),
                    ..tx
                },
            );
        }
        let index = state.blocks.len();
        state.by_hash.insert(hash, index);
        let proposer = *signed.signer();
        state.blocks.push(StoredBlock {
            hash,
            height,
            envelope: signed,
            payload,
        });
        info!(
            block = %hash,
            height,
            proposer = %proposer.short(),
            "block accepted"
        );
        Ok((hash, height))
    }

    fn verify_leader_proof(&self, signed: &SignedEnvelope, payload: &BlockPayload) -> Result<()> {
        let proof = &payload.leader_proof;
        if proof.slot_number != payload.slot_number {
            return Err(ChainError::InvalidLeaderProof(format!(
                "proof for slot {}, block at slot {}",
                proof.slot_number, payload.slot_number
            )));
        }
        if proof.previous_block_hash != payload.previous_block_hash {
            return Err(ChainError::InvalidLeaderProof(
                "proof bound to a different previous block".to_string(),
            ));
        }

        let output = self
            .vrf
            .verify(&signed.signature.public_key, &proof.message(), &proof.randomness.proof)
            .map_err(|e| {
                warn!(proposer = %signed.signer(), error = %e, "leader proof rejected");
                ChainError::InvalidLeaderProof(e.to_string())
            })?;
        if output.as_slice() != proof.randomness.output.as_slice() {
            return Err(ChainError::InvalidLeaderProof(
                "output does not match proof".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_transactions(&self, payload: &BlockPayload) -> Result<Vec<(TxHash, StoredTransaction)>> {
        payload
            .transactions
            .iter()
            .map(|tx| {
                if tx.type_tag != tags::TRANSACTION {
                    return Err(ChainError::InvalidTransaction(format!(
                        "type tag {}",
                        tx.type_tag
                    )));
                }
                self.auth.verify(tx)?;
                let decoded: TransactionPayload = cbor::from_slice_named(&tx.payload, &tx.type_tag)
                    .map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;
                let hash = envelope_hash(tx);
                Ok((
                    hash,
                    StoredTransaction {
                        hash,
                        envelope: tx.clone(),
                        payload: decoded,
                        block_height: None,
                    },
                ))
            })
            .collect()
    }
}

impl StakeLedger for ChainStore {
    fn stake_of(&self, address: &AccountAddress) -> u64 {
        self.state().accounts.get(address).map_or(0, |a| a.stake)
    }
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ChainStore")
            .field("accounts", &state.accounts.len())
            .field("blocks", &state.blocks.len())
            .field("mempool", &state.mempool.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use meridian_auth::ManualClock;
    use meridian_crypto::provider::{AccountKeypair, SchemeRegistry};
    use meridian_crypto::vrf::PallasVrf;
    use meridian_types::{
        LeaderElectionProof, SignatureScheme, TransactionKind, VerifiableRandomness,
    };

    use meridian_transport::envelope::to_wire;

    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn store(genesis: Vec<AccountBalance>) -> (ChainStore, AuthenticatedMessageService) {
        store_with_capacity(genesis, 64)
    }

    fn store_with_capacity(
        genesis: Vec<AccountBalance>,
        mempool_capacity: usize,
    ) -> (ChainStore, AuthenticatedMessageService) {
        let auth = AuthenticatedMessageService::new(
            SchemeRegistry::with_default_schemes(),
            Arc::new(ManualClock::new(NOW)),
        );
        let store = ChainStore::new(
            auth.clone(),
            Arc::new(PallasVrf),
            Duration::from_secs(30),
            mempool_capacity,
            genesis,
        );
        (store, auth)
    }

    fn keypair() -> AccountKeypair {
        AccountKeypair::generate(SignatureScheme::SchnorrPallasSha3).expect("keypair")
    }

    fn transaction(auth: &AuthenticatedMessageService, kp: &AccountKeypair, nonce: u64) -> SignedEnvelope {
        let payload = TransactionPayload {
            nonce,
            timestamp: NOW + nonce,
            kind: TransactionKind::Stake { amount: 5 },
        };
        auth.sign_payload(tags::TRANSACTION, &payload, kp).expect("sign")
    }

    fn block(
        kp: &AccountKeypair,
        slot: u64,
        prev: BlockHash,
        transactions: Vec<SignedEnvelope>,
    ) -> BlockPayload {
        let message = LeaderElectionProof::seed_message(slot, &prev);
        let (output, proof) = PallasVrf::prove(kp.secret(), &message).expect("prove");
        BlockPayload {
            slot_number: slot,
            previous_block_hash: prev,
            leader_proof: LeaderElectionProof {
                slot_number: slot,
                previous_block_hash: prev,
                randomness: VerifiableRandomness {
                    output: output.to_vec(),
                    proof,
                },
            },
            timestamp: NOW + slot,
            transactions,
        }
    }

    fn sign_block(auth: &AuthenticatedMessageService, kp: &AccountKeypair, payload: &BlockPayload) -> WireEnvelope {
        to_wire(&auth.sign_payload(tags::BLOCK, payload, kp).expect("sign"))
    }

    #[test]
    fn test_genesis_balances_and_stake() {
        let address = AccountAddress::from_bytes(&[7; 32]);
        let (store, _) = store(vec![AccountBalance {
            address,
            balance: 1000,
            stake: 40,
        }]);
        assert_eq!(store.balance(&address).balance, 1000);
        assert_eq!(store.stake_of(&address), 40);
        let unknown = AccountAddress::from_bytes(&[8; 32]);
        assert_eq!(store.balance(&unknown).address, unknown);
        assert_eq!(store.stake_of(&unknown), 0);
    }

    #[test]
    fn test_transaction_pooled_and_replay_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let tx = transaction(&auth, &kp, 1);

        let hash = store.submit_transaction(&to_wire(&tx)).expect("submit");
        assert_eq!(store.mempool_len(), 1);
        assert_eq!(store.transaction(&hash).expect("stored").block_height, None);

        let err = store.submit_transaction(&to_wire(&tx)).expect_err("replay");
        assert!(matches!(err, ChainError::Auth(AuthError::ReplayDetected { .. })));
    }

    #[test]
    fn test_transaction_wrong_tag_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let payload = TransactionPayload {
            nonce: 1,
            timestamp: NOW,
            kind: TransactionKind::Unstake { amount: 1 },
        };
        let signed = auth.sign_payload(tags::BLOCK, &payload, &kp).expect("sign");
        assert!(matches!(
            store.submit_transaction(&to_wire(&signed)),
            Err(ChainError::Auth(AuthError::MalformedEnvelope(_)))
        ));
    }

    #[test]
    fn test_blocks_extend_tip() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let tx = transaction(&auth, &kp, 1);
        let tx_hash = store.submit_transaction(&to_wire(&tx)).expect("submit");

        let first = sign_block(&auth, &kp, &block(&kp, 1, Word256::ZERO, vec![tx]));
        let (hash, height) = store.submit_block(&first).expect("first block");
        assert_eq!(height, 0);
        assert_eq!(store.tip_hash(), hash);
        assert_eq!(store.mempool_len(), 0);
        assert_eq!(store.transaction(&tx_hash).expect("tx").block_height, Some(0));

        let second = sign_block(&auth, &kp, &block(&kp, 3, hash, Vec::new()));
        let (second_hash, height) = store.submit_block(&second).expect("second block");
        assert_eq!(height, 1);
        assert_eq!(store.block_at(1).expect("by height").hash, second_hash);
        assert_eq!(store.block_by_hash(&hash).expect("by hash").height, 0);
        assert_eq!(store.height(), Some(1));
    }

    #[test]
    fn test_fork_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let first = sign_block(&auth, &kp, &block(&kp, 1, Word256::ZERO, Vec::new()));
        store.submit_block(&first).expect("first");

        let fork = sign_block(&auth, &kp, &block(&kp, 2, Word256::ZERO, Vec::new()));
        assert!(matches!(store.submit_block(&fork), Err(ChainError::NotExtendingTip(_))));
    }

    #[test]
    fn test_tampered_leader_output_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let mut payload = block(&kp, 1, Word256::ZERO, Vec::new());
        payload.leader_proof.randomness.output[0] ^= 0xFF;
        let err = store.submit_block(&sign_block(&auth, &kp, &payload)).expect_err("tampered");
        assert!(matches!(err, ChainError::InvalidLeaderProof(_)));
    }

    #[test]
    fn test_leader_proof_for_other_slot_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let mut payload = block(&kp, 1, Word256::ZERO, Vec::new());
        payload.slot_number = 2;
        let err = store.submit_block(&sign_block(&auth, &kp, &payload)).expect_err("slot");
        assert!(matches!(err, ChainError::InvalidLeaderProof(_)));
    }

    #[test]
    fn test_leader_proof_by_other_key_rejected() {
        let (store, auth) = store(Vec::new());
        let leader = keypair();
        let impostor = keypair();
        let payload = block(&leader, 1, Word256::ZERO, Vec::new());
        let err = store
            .submit_block(&sign_block(&auth, &impostor, &payload))
            .expect_err("impostor");
        assert!(matches!(err, ChainError::InvalidLeaderProof(_)));
    }

    #[test]
    fn test_non_canonical_transaction_rejected() {
        let (store, auth) = store(Vec::new());
        let kp = keypair();
        let mut wire = to_wire(&transaction(&auth, &kp, 1));
        wire.envelope.push(0);
        assert!(matches!(
            store.submit_transaction(&wire),
            Err(ChainError::Auth(AuthError::MalformedEnvelope(_)))
        ));
        assert_eq!(store.mempool_len(), 0);
    }

    #[test]
    fn test_mempool_cap_refuses_new_transactions() {
        let (store, auth) = store_with_capacity(Vec::new(), 3);
        let kp = keypair();
        for nonce in 1..=3 {
            store
                .submit_transaction(&to_wire(&transaction(&auth, &kp, nonce)))
                .expect("within cap");
        }
        assert_eq!(store.mempool_len(), 3);

        let overflow = to_wire(&transaction(&auth, &kp, 4));
        let err = store.submit_transaction(&overflow).expect_err("full");
        assert!(matches!(err, ChainError::MempoolFull { capacity: 3 }));
        assert_eq!(store.mempool_len(), 3);

        // Including pooled transactions in a block frees room; the refused
        // transaction was never recorded as seen and is accepted on retry.
        let pooled: Vec<SignedEnvelope> = (1..=3).map(|n| transaction(&auth, &kp, n)).collect();
        let first = sign_block(&auth, &kp, &block(&kp, 1, Word256::ZERO, pooled));
        store.submit_block(&first).expect("block");
        assert_eq!(store.mempool_len(), 0);
        store.submit_transaction(&overflow).expect("room again");
        assert_eq!(store.mempool_len(), 1);
    }
}
