//! Sans-IO negotiation state machines.
//!
//! [`JoinerSession`] and [`ResponderSession`] consume peer frames and return
//! the frames to send back. Neither touches a socket or a timer; the
//! [`driver`](crate::driver) supplies both.
//!
//! ```text
//! Init -> IdentityExchanged -> ProposalPending{proposer} <-> ProposalPending{other}
//!                                      |
//!                                      v
//!                                  Converged -> Closed
//! any state -> Aborted{reason}
//! ```
//!
//! A failed step aborts the session; an aborted session commits nothing and
//! rejects every further frame.

use std::fmt;
use std::sync::Arc;

use meridian_auth::{AuthError, AuthenticatedMessageService, FreshnessPolicy, ReplayGuard};
use meridian_crypto::blake3::{self, contexts};
use meridian_crypto::provider::AccountKeypair;
use meridian_topology::{GeoTopologyModel, Preference, ScoredTopology};
use meridian_transport::envelope;
use meridian_transport::messages::{RequestFrame, ResponseFrame};
use meridian_types::{
    tags, AccountAddress, NetworkTopology, NodeIdentity, SignedEnvelope, TopologyAgreement,
    TopologyProposal, TopologySnapshot, WireEnvelope, Word256, PROTOCOL_VERSION,
};

use crate::eligibility::StakeLedger;
use crate::registry::IdentityRegistry;
use crate::{AbortReason, NegotiationConfig, NegotiationError, Result, Role};

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    IdentityExchanged,
    /// A signed proposal from `proposer` awaits the other side's answer.
    ProposalPending { proposer: Role },
    Converged,
    Closed,
    Aborted(AbortReason),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::IdentityExchanged => write!(f, "identity_exchanged"),
            Self::ProposalPending { proposer } => write!(f, "proposal_pending({proposer})"),
            Self::Converged => write!(f, "converged"),
            Self::Closed => write!(f, "closed"),
            Self::Aborted(reason) => write!(f, "aborted({reason})"),
        }
    }
}

/// Result of a closed session.
#[derive(Clone, Debug, PartialEq)]
pub struct NegotiationOutcome {
    /// The accepted proposal with both parties' signatures.
    pub agreement: TopologyAgreement,
    pub topology: NetworkTopology,
    pub score: f64,
    /// Committed version the agreed topology was computed against.
    pub baseline_version: u64,
    /// Registry version after the commit. Responder only.
    pub committed_version: Option<u64>,
    /// Proposals exchanged.
    pub rounds: u32,
}

impl NegotiationOutcome {
    /// The topology as it should be installed by the joiner.
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            version: self.baseline_version + 1,
            topology: self.topology.clone(),
        }
    }
}

/// Collaborators every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub auth: AuthenticatedMessageService,
    pub model: GeoTopologyModel,
    pub config: NegotiationConfig,
    pub keypair: Arc<AccountKeypair>,
}

/// Bind a session to the joiner's signed identity.
pub fn session_id(identity_envelope: &SignedEnvelope) -> Word256 {
    let canonical = envelope::encode(&identity_envelope.type_tag, &identity_envelope.payload);
    let material =
        blake3::encode_multi_field(&[&canonical, &identity_envelope.signature.signature]);
    Word256::from_bytes(&blake3::derive_key(
        contexts::NEGOTIATION_SESSION_ID,
        &material,
    ))
}

/// State shared by both roles.
struct SessionCore {
    role: Role,
    ctx: SessionContext,
    guard: Arc<dyn ReplayGuard>,
    state: SessionState,
    session_id: Word256,
    peer: Option<AccountAddress>,
    joiner: Option<NodeIdentity>,
    baseline_version: u64,
    /// Every node the topology must partition, joiner included.
    expected: Vec<NodeIdentity>,
    /// The last proposal exchanged, in either direction.
    best: Option<ScoredTopology>,
    /// Envelope of `best`.
    pending: Option<SignedEnvelope>,
    last_peer_timestamp: u64,
    last_own_timestamp: u64,
    rounds: u32,
    reseeded: bool,
    outcome: Option<NegotiationOutcome>,
}

impl SessionCore {
    fn new(role: Role, ctx: SessionContext, guard: Arc<dyn ReplayGuard>) -> Self {
        Self {
            role,
            ctx,
            guard,
            state: SessionState::Init,
            session_id: Word256::ZERO,
            peer: None,
            joiner: None,
            baseline_version: 0,
            expected: Vec::new(),
            best: None,
            pending: None,
            last_peer_timestamp: 0,
            last_own_timestamp: 0,
            rounds: 0,
            reseeded: false,
            outcome: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Aborted(reason) => Err(NegotiationError::Aborted(reason)),
            SessionState::Closed => Err(NegotiationError::InvalidState {
                expected: "open session".to_string(),
                actual: SessionState::Closed.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn require(&self, allowed: bool, expected: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(NegotiationError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn fail(&mut self, err: NegotiationError) -> NegotiationError {
        let reason = err.reason();
        tracing::warn!(
            role = %self.role,
            session = %self.session_id,
            round = self.rounds,
            %reason,
            error = %err,
            "negotiation aborted"
        );
        self.state = SessionState::Aborted(reason);
        err
    }

    fn own_address(&self) -> AccountAddress {
        self.ctx.keypair.address()
    }

    fn policy(&self, tag: &str) -> FreshnessPolicy {
        FreshnessPolicy::new(tag, self.ctx.config.max_clock_skew)
    }

    /// Own proposal timestamps strictly increase even within one millisecond.
    fn next_timestamp(&mut self) -> u64 {
        let timestamp = self.ctx.auth.now_ms().max(self.last_own_timestamp + 1);
        self.last_own_timestamp = timestamp;
        timestamp
    }

    fn count_round(&mut self) -> Result<()> {
        self.rounds += 1;
        if self.rounds > self.ctx.config.max_rounds {
            return Err(NegotiationError::RoundLimit(self.ctx.config.max_rounds));
        }
        Ok(())
    }

    /// Sign `candidate` as this side's proposal and make it the pending one.
    fn sign_proposal(&mut self, candidate: ScoredTopology) -> Result<SignedEnvelope> {
        self.count_round()?;
        let proposal = TopologyProposal {
            session_id: self.session_id,
            baseline_version: self.baseline_version,
            topology: candidate.topology.clone(),
            timestamp: self.next_timestamp(),
        };
        let signed = self
            .ctx
            .auth
            .sign_payload(tags::TOPOLOGY_PROPOSAL, &proposal, &self.ctx.keypair)?;

        tracing::debug!(
            role = %self.role,
            session = %self.session_id,
            round = self.rounds,
            score = candidate.score,
            "proposal sent"
        );
        self.best = Some(candidate);
        self.pending = Some(signed.clone());
        self.state = SessionState::ProposalPending {
            proposer: self.role,
        };
        Ok(signed)
    }

    /// Pin the peer on first contact. A joiner only talks to a baseline member.
    fn check_sender(&mut self, signer: &AccountAddress) -> Result<()> {
        match self.peer {
            Some(peer) if peer == *signer => Ok(()),
            Some(peer) => Err(NegotiationError::ProtocolViolation(format!(
                "frame signed by {signer}, peer is {peer}"
            ))),
            None => {
                let is_member = *signer != self.own_address()
                    && self.expected.iter().any(|m| m.account_address == *signer);
                if !is_member {
                    return Err(NegotiationError::ProtocolViolation(format!(
                        "{signer} is not a member of the baseline"
                    )));
                }
                self.peer = Some(*signer);
                Ok(())
            }
        }
    }

    /// Authenticate, validate and rescore a peer proposal, making it the
    /// pending one.
    fn receive_proposal(&mut self, wire: &WireEnvelope) -> Result<ScoredTopology> {
        let policy = self.policy(tags::TOPOLOGY_PROPOSAL);
        let (signed, proposal): (SignedEnvelope, TopologyProposal) =
            self.ctx
                .auth
                .verify_fresh_wire(wire, &policy, self.guard.as_ref())?;

        if proposal.session_id != self.session_id {
            return Err(NegotiationError::ProtocolViolation(format!(
                "proposal for session {}",
                proposal.session_id
            )));
        }
        self.check_sender(signed.signer())?;
        if proposal.timestamp <= self.last_peer_timestamp {
            return Err(NegotiationError::ProposalNotNewer {
                timestamp: proposal.timestamp,
                last: self.last_peer_timestamp,
            });
        }

        if proposal.baseline_version != self.baseline_version {
            let reseed = self.role == Role::Joiner
                && proposal.baseline_version > self.baseline_version
                && !self.reseeded;
            if !reseed {
                return Err(NegotiationError::StaleTopology {
                    expected: self.baseline_version,
                    actual: proposal.baseline_version,
                });
            }
            self.accept_reseed(&proposal)?;
        }

        self.ctx.model.validate(&proposal.topology, &self.expected)?;
        let scored = self.ctx.model.scored(proposal.topology);
        if let Some(best) = &self.best {
            if self.ctx.model.compare(&scored, best) != Preference::Better {
                return Err(NegotiationError::NonImprovingProposal);
            }
        }

        self.count_round()?;
        tracing::debug!(
            role = %self.role,
            session = %self.session_id,
            round = self.rounds,
            score = scored.score,
            "proposal accepted for consideration"
        );
        self.last_peer_timestamp = proposal.timestamp;
        self.best = Some(scored.clone());
        self.pending = Some(signed);
        self.state = SessionState::ProposalPending {
            proposer: self.role.other(),
        };
        Ok(scored)
    }

    /// The responder re-seeded after a stale commit. Accept the new node set
    /// only if it still contains every node we expected, unaltered.
    fn accept_reseed(&mut self, proposal: &TopologyProposal) -> Result<()> {
        let members: Vec<NodeIdentity> = proposal.topology.members().cloned().collect();
        if let Some(missing) = self.expected.iter().find(|e| !members.contains(e)) {
            tracing::warn!(node = %missing.account_address, "re-seeded baseline dropped a node");
            return Err(NegotiationError::StaleTopology {
                expected: self.baseline_version,
                actual: proposal.baseline_version,
            });
        }
        tracing::info!(
            session = %self.session_id,
            from = self.baseline_version,
            to = proposal.baseline_version,
            nodes = members.len(),
            "following responder re-seed"
        );
        self.reseeded = true;
        self.baseline_version = proposal.baseline_version;
        self.expected = members;
        self.best = None;
        Ok(())
    }

    /// The best local candidate strictly better than the pending proposal.
    fn better_candidate(&self) -> Option<ScoredTopology> {
        let current = self.best.as_ref()?;
        let mut best: Option<ScoredTopology> = None;
        let candidates = [
            Some(self.ctx.model.propose(&self.expected)),
            self.ctx.model.improve(current),
        ];
        for candidate in candidates.into_iter().flatten() {
            let reference = best.as_ref().unwrap_or(current);
            if self.ctx.model.compare(&candidate, reference) == Preference::Better {
                best = Some(candidate);
            }
        }
        best
    }

    /// Counter if possible, otherwise `None`.
    fn counter(&mut self) -> Result<Option<WireEnvelope>> {
        match self.better_candidate() {
            Some(candidate) => Ok(Some(envelope::to_wire(&self.sign_proposal(candidate)?))),
            None => Ok(None),
        }
    }

    /// Co-sign the peer's pending proposal.
    fn accept(&mut self) -> Result<TopologyAgreement> {
        let pending = self
            .pending
            .clone()
            .ok_or_else(|| NegotiationError::ProtocolViolation("nothing to accept".to_string()))?;
        let acceptance = self
            .ctx
            .auth
            .sign(&pending.type_tag, pending.payload.clone(), &self.ctx.keypair)?;
        self.state = SessionState::Converged;
        Ok(TopologyAgreement {
            type_tag: pending.type_tag,
            proposal: pending.payload,
            peer_signature: pending.signature,
            own_signature: acceptance.signature,
        })
    }

    /// Both signatures valid over the pending proposal's exact bytes, signed
    /// by exactly the joiner and the responder, proposer first.
    fn verify_agreement(&self, agreement: &TopologyAgreement) -> Result<()> {
        if agreement.type_tag != tags::TOPOLOGY_PROPOSAL {
            return Err(AuthError::MalformedEnvelope(format!(
                "agreement over type tag {}",
                agreement.type_tag
            ))
            .into());
        }
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| NegotiationError::ProtocolViolation("no pending proposal".to_string()))?;
        if agreement.proposal != pending.payload {
            return Err(NegotiationError::ProtocolViolation(
                "agreement covers a different proposal".to_string(),
            ));
        }

        self.ctx.auth.verify(&agreement.proposal_envelope())?;
        self.ctx.auth.verify(&agreement.acceptance_envelope())?;

        let proposer = agreement.peer_signature.signer;
        let acceptor = agreement.own_signature.signer;
        let peer = self
            .peer
            .ok_or_else(|| NegotiationError::ProtocolViolation("peer unknown".to_string()))?;
        let parties = [self.own_address(), peer];
        if proposer != *pending.signer()
            || proposer == acceptor
            || !parties.contains(&proposer)
            || !parties.contains(&acceptor)
        {
            return Err(NegotiationError::ProtocolViolation(
                "agreement signers are not the session parties".to_string(),
            ));
        }
        Ok(())
    }

    fn close(&mut self, agreement: TopologyAgreement, committed_version: Option<u64>) -> Result<()> {
        let best = self
            .best
            .clone()
            .ok_or_else(|| NegotiationError::ProtocolViolation("no agreed topology".to_string()))?;
        tracing::info!(
            role = %self.role,
            session = %self.session_id,
            rounds = self.rounds,
            score = best.score,
            clusters = best.topology.cluster_count(),
            "negotiation closed"
        );
        self.outcome = Some(NegotiationOutcome {
            agreement,
            topology: best.topology,
            score: best.score,
            baseline_version: self.baseline_version,
            committed_version,
            rounds: self.rounds,
        });
        self.state = SessionState::Closed;
        Ok(())
    }
}

macro_rules! session_accessors {
    () => {
        pub fn state(&self) -> SessionState {
            self.core.state
        }

        pub fn session_id(&self) -> Word256 {
            self.core.session_id
        }

        pub fn rounds(&self) -> u32 {
            self.core.rounds
        }

        pub fn config(&self) -> &NegotiationConfig {
            &self.core.ctx.config
        }

        pub fn outcome(&self) -> Option<&NegotiationOutcome> {
            self.core.outcome.as_ref()
        }

        pub fn take_outcome(&mut self) -> Option<NegotiationOutcome> {
            self.core.outcome.take()
        }

        pub fn is_finished(&self) -> bool {
            matches!(
                self.core.state,
                SessionState::Closed | SessionState::Aborted(_)
            )
        }

        /// Abort locally, e.g. on timeout. Closed sessions stay closed.
        pub fn abort(&mut self, reason: AbortReason) {
            if !self.is_finished() {
                tracing::info!(role = %self.core.role, session = %self.core.session_id, %reason, "session aborted locally");
                self.core.state = SessionState::Aborted(reason);
            }
        }

        fn guarded<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
            self.core.ensure_open()?;
            step(self).map_err(|e| self.core.fail(e))
        }
    };
}

/// The joining node's side.
pub struct JoinerSession {
    core: SessionCore,
    identity: NodeIdentity,
    baseline: TopologySnapshot,
}

impl JoinerSession {
    /// `baseline` is the responder's committed topology as served by
    /// `get_topology`; `guard` remembers responder envelopes.
    pub fn new(
        ctx: SessionContext,
        identity: NodeIdentity,
        baseline: TopologySnapshot,
        guard: Arc<dyn ReplayGuard>,
    ) -> Self {
        Self {
            core: SessionCore::new(Role::Joiner, ctx, guard),
            identity,
            baseline,
        }
    }

    session_accessors!();

    /// Sign the identity and the initial proposal.
    pub fn start(&mut self) -> Result<Vec<RequestFrame>> {
        self.guarded(|s| s.start_inner())
    }

    fn start_inner(&mut self) -> Result<Vec<RequestFrame>> {
        let core = &mut self.core;
        core.require(core.state == SessionState::Init, "init")?;

        let own = core.own_address();
        if self.baseline.topology.contains(&own) {
            return Err(NegotiationError::NotEligible(format!("{own} is already a member")));
        }

        self.identity.account_address = own;
        self.identity.timestamp = core.ctx.auth.now_ms();
        let identity_envelope =
            core.ctx
                .auth
                .sign_payload(tags::NODE_IDENTITY, &self.identity, &core.ctx.keypair)?;

        core.session_id = session_id(&identity_envelope);
        core.joiner = Some(self.identity.clone());
        core.baseline_version = self.baseline.version;
        core.expected = self.baseline.topology.members().cloned().collect();
        core.expected.push(self.identity.clone());
        core.state = SessionState::IdentityExchanged;
        tracing::info!(
            session = %core.session_id,
            baseline = core.baseline_version,
            nodes = core.expected.len(),
            "joining"
        );

        let candidate = core.ctx.model.propose(&core.expected);
        let proposal = core.sign_proposal(candidate)?;
        Ok(vec![
            RequestFrame::JoinerIdentity(envelope::to_wire(&identity_envelope)),
            RequestFrame::Proposal(envelope::to_wire(&proposal)),
        ])
    }

    /// Handle one responder frame. Returns the reply, if any.
    pub fn handle(&mut self, frame: ResponseFrame) -> Result<Option<RequestFrame>> {
        self.guarded(|s| s.handle_inner(frame))
    }

    fn handle_inner(&mut self, frame: ResponseFrame) -> Result<Option<RequestFrame>> {
        let core = &mut self.core;
        match frame {
            ResponseFrame::Close { reason } => Err(NegotiationError::PeerClosed(reason)),
            ResponseFrame::Proposal(wire) => {
                let converged = core.state == SessionState::Converged;
                core.require(
                    converged
                        || core.state
                            == (SessionState::ProposalPending {
                                proposer: Role::Joiner,
                            }),
                    "proposal_pending(joiner) or converged",
                )?;
                let baseline_before = core.baseline_version;
                core.receive_proposal(&wire)?;
                if converged && core.baseline_version == baseline_before {
                    return Err(NegotiationError::ProtocolViolation(
                        "proposal after acceptance without re-seed".to_string(),
                    ));
                }

                if let Some(counter) = core.counter()? {
                    return Ok(Some(RequestFrame::Proposal(counter)));
                }
                let agreement = core.accept()?;
                Ok(Some(RequestFrame::Agreement(agreement)))
            }
            ResponseFrame::Agreement(agreement) => {
                core.require(
                    core.state == SessionState::Converged
                        || core.state
                            == (SessionState::ProposalPending {
                                proposer: Role::Joiner,
                            }),
                    "proposal_pending(joiner) or converged",
                )?;
                core.verify_agreement(&agreement)?;
                core.state = SessionState::Converged;
                core.close(agreement, None)?;
                Ok(None)
            }
        }
    }
}

/// An existing member's side. Commits to the shared registry on agreement.
pub struct ResponderSession {
    core: SessionCore,
    registry: Arc<IdentityRegistry>,
    stake: Arc<dyn StakeLedger>,
}

impl ResponderSession {
    pub fn new(ctx: SessionContext, registry: Arc<IdentityRegistry>, stake: Arc<dyn StakeLedger>) -> Self {
        let guard: Arc<dyn ReplayGuard> = registry.clone();
        Self {
            core: SessionCore::new(Role::Responder, ctx, guard),
            registry,
            stake,
        }
    }

    session_accessors!();

    /// Handle one joiner frame. Returns the frames to send back.
    pub fn handle(&mut self, frame: RequestFrame) -> Result<Vec<ResponseFrame>> {
        self.guarded(|s| s.handle_inner(frame))
    }

    fn handle_inner(&mut self, frame: RequestFrame) -> Result<Vec<ResponseFrame>> {
        match frame {
            RequestFrame::Close { reason } => Err(NegotiationError::PeerClosed(reason)),
            RequestFrame::JoinerIdentity(wire) => {
                self.core
                    .require(self.core.state == SessionState::Init, "init")?;
                self.admit_joiner(&wire)?;
                Ok(Vec::new())
            }
            RequestFrame::Proposal(wire) => {
                self.core.require(
                    self.core.state == SessionState::IdentityExchanged
                        || self.core.state
                            == (SessionState::ProposalPending {
                                proposer: Role::Responder,
                            }),
                    "identity_exchanged or proposal_pending(responder)",
                )?;
                self.core.receive_proposal(&wire)?;
                if let Some(counter) = self.core.counter()? {
                    return Ok(vec![ResponseFrame::Proposal(counter)]);
                }
                let agreement = self.core.accept()?;
                self.commit(agreement)
            }
            RequestFrame::Agreement(agreement) => {
                self.core.require(
                    self.core.state
                        == (SessionState::ProposalPending {
                            proposer: Role::Responder,
                        }),
                    "proposal_pending(responder)",
                )?;
                self.core.verify_agreement(&agreement)?;
                self.core.state = SessionState::Converged;
                self.commit(agreement)
            }
        }
    }

    fn admit_joiner(&mut self, wire: &WireEnvelope) -> Result<()> {
        let policy = self.core.policy(tags::NODE_IDENTITY);
        let (signed, identity): (SignedEnvelope, NodeIdentity) =
            self.core
                .ctx
                .auth
                .verify_fresh_wire(wire, &policy, self.registry.as_ref())?;

        if *signed.signer() != identity.account_address {
            return Err(AuthError::AddressMismatch {
                declared: identity.account_address,
                derived: *signed.signer(),
            }
            .into());
        }
        if identity.protocol_version != PROTOCOL_VERSION {
            return Err(NegotiationError::InvalidIdentity(format!(
                "protocol version {}",
                identity.protocol_version
            )));
        }
        if !identity.geo_location.is_valid() {
            return Err(NegotiationError::InvalidIdentity(format!(
                "location {:?} out of range",
                identity.geo_location
            )));
        }
        self.check_eligible(&identity)?;

        let baseline = self.registry.baseline();
        let core = &mut self.core;
        core.session_id = session_id(&signed);
        core.peer = Some(identity.account_address);
        core.baseline_version = baseline.version;
        core.expected = baseline.members;
        core.expected.push(identity.clone());
        core.joiner = Some(identity);
        core.state = SessionState::IdentityExchanged;
        tracing::info!(
            session = %core.session_id,
            joiner = %signed.signer().short(),
            baseline = core.baseline_version,
            "joiner identity accepted"
        );
        Ok(())
    }

    fn check_eligible(&self, identity: &NodeIdentity) -> Result<()> {
        if self.registry.is_member(&identity.account_address) {
            return Err(NegotiationError::NotEligible(format!(
                "{} is already a member",
                identity.account_address
            )));
        }
        let stake = self.stake.stake_of(&identity.account_address);
        let min_stake = self.core.ctx.config.min_stake;
        if stake < min_stake {
            return Err(NegotiationError::NotEligible(format!(
                "stake {stake} below minimum {min_stake}"
            )));
        }
        Ok(())
    }

    /// Commit the agreed topology, re-seeding once if the baseline moved.
    fn commit(&mut self, agreement: TopologyAgreement) -> Result<Vec<ResponseFrame>> {
        let joiner = self
            .core
            .joiner
            .clone()
            .ok_or_else(|| NegotiationError::ProtocolViolation("no joiner".to_string()))?;
        let topology = self
            .core
            .best
            .as_ref()
            .map(|b| b.topology.clone())
            .ok_or_else(|| NegotiationError::ProtocolViolation("no agreed topology".to_string()))?;

        match self
            .registry
            .commit(self.core.baseline_version, joiner.clone(), topology)
        {
            Ok(version) => {
                self.core.close(agreement.clone(), Some(version))?;
                Ok(vec![ResponseFrame::Agreement(agreement)])
            }
            Err(NegotiationError::StaleTopology { expected, actual }) if !self.core.reseeded => {
                tracing::info!(
                    session = %self.core.session_id,
                    expected,
                    actual,
                    "baseline moved, re-seeding"
                );
                let proposal = self.reseed(&joiner)?;
                Ok(vec![ResponseFrame::Proposal(proposal)])
            }
            Err(err) => Err(err),
        }
    }

    fn reseed(&mut self, joiner: &NodeIdentity) -> Result<WireEnvelope> {
        self.check_eligible(joiner)?;
        let baseline = self.registry.baseline();
        let core = &mut self.core;
        core.reseeded = true;
        core.baseline_version = baseline.version;
        core.expected = baseline.members;
        core.expected.push(joiner.clone());
        core.best = None;
        let candidate = core.ctx.model.propose(&core.expected);
        Ok(envelope::to_wire(&core.sign_proposal(candidate)?))
    }
}
