//! The chain acceptor.

use crate::sync::SyncDecision;
use crate::{genesis, verifiers, BlockStore, CandidateStore, ChainError, StorageError, Synchroniser};
use parking_lot::RwLock;
use sba_core::{Action, Event, OutboundMessage};
use sba_types::consts::{
    CONSENSUS_MAX_COMMITTEE_SIZE, REDUCTION_QUORUM_THRESHOLD, STAKE_ACTIVATION_OFFSET,
};
use sba_types::{
    Bid, BidList, Block, Certificate, Hash, Provisioners, RoundUpdate, Stake, Transaction,
    TransactionPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Published view of the chain tip for readers outside the acceptor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipSnapshot {
    pub height: u64,
    pub hash: Hash,
    pub intermediate_height: Option<u64>,
}

/// Heights at or below this are exempt from certificate verification: the
/// chain base is the genesis block and the bootstrap intermediate.
const CERT_EXEMPT_HEIGHT: u64 = 1;

/// Deadline for round-results queries.
const ROUND_RESULTS_TIMEOUT: Duration = Duration::from_secs(5);

/// The canonical chain state and its acceptance pipeline.
///
/// Runs as part of the single node state machine task; all mutation is
/// serialised through it. Readers outside the task observe the tip through
/// the snapshot lock.
pub struct Chain {
    db: Arc<dyn BlockStore>,
    prev_block: Block,
    intermediate: Option<Block>,
    last_certificate: Certificate,
    provisioners: Provisioners,
    bid_list: BidList,
    candidates: CandidateStore,
    sync: Synchroniser,
    tip: Arc<RwLock<TipSnapshot>>,
}

impl Chain {
    /// Bootstrap a fresh chain: persist genesis, install the placeholder
    /// intermediate at height 1, and emit the first round update
    /// (round 2).
    pub fn bootstrap(
        db: Arc<dyn BlockStore>,
        provisioners: Provisioners,
        bid_list: BidList,
    ) -> Result<(Self, Vec<Action>), ChainError> {
        let genesis_block = genesis::block();
        db.store_block(&genesis_block)?;
        let intermediate = genesis::mock_intermediate(&genesis_block);

        let tip = Arc::new(RwLock::new(TipSnapshot {
            height: 0,
            hash: genesis_block.hash(),
            intermediate_height: Some(1),
        }));

        let mut chain = Self {
            db,
            prev_block: genesis_block,
            intermediate: Some(intermediate),
            last_certificate: Certificate::empty(),
            provisioners,
            bid_list,
            candidates: CandidateStore::new(),
            sync: Synchroniser::new(),
            tip,
        };
        let actions = chain.send_round_update();
        Ok((chain, actions))
    }

    /// Reopen a chain from an existing store. The provisioner set and bid
    /// list are repopulated by walking the stored blocks from genesis; the
    /// intermediate block is unknown after a restart and is recovered via
    /// the round-results fallback once peers are reachable.
    pub fn load(db: Arc<dyn BlockStore>) -> Result<Self, ChainError> {
        let tip_hash = db.tip()?.ok_or(ChainError::VerificationFailed("empty store"))?;
        let prev_block = db
            .block_by_hash(&tip_hash)?
            .ok_or_else(|| StorageError::Corrupted("tip block missing".to_string()))?;

        let tip = Arc::new(RwLock::new(TipSnapshot {
            height: prev_block.height(),
            hash: prev_block.hash(),
            intermediate_height: None,
        }));

        let mut chain = Self {
            db,
            prev_block,
            intermediate: None,
            last_certificate: Certificate::empty(),
            provisioners: Provisioners::default(),
            bid_list: BidList::default(),
            candidates: CandidateStore::new(),
            sync: Synchroniser::new(),
            tip,
        };

        // Replay stake and bid registrations from the stored chain.
        for height in 0..=chain.prev_block.height() {
            if let Some(block) = chain.db.block_by_height(height)? {
                chain.register_consensus_txs(&block.txs, height);
            }
        }
        chain.provisioners.remove_expired(chain.prev_block.height() + 1);
        chain.bid_list.remove_expired(chain.prev_block.height() + 1);
        chain.last_certificate = chain.prev_block.header.certificate;

        info!(
            height = chain.prev_block.height(),
            provisioners = chain.provisioners.len(),
            "chain loaded from store"
        );
        Ok(chain)
    }

    pub fn prev_block(&self) -> &Block {
        &self.prev_block
    }

    pub fn intermediate(&self) -> Option<&Block> {
        self.intermediate.as_ref()
    }

    pub fn provisioners(&self) -> &Provisioners {
        &self.provisioners
    }

    pub fn bid_list(&self) -> &BidList {
        &self.bid_list
    }

    pub fn last_certificate(&self) -> &Certificate {
        &self.last_certificate
    }

    pub fn candidates(&self) -> &CandidateStore {
        &self.candidates
    }

    pub fn synchroniser(&self) -> &Synchroniser {
        &self.sync
    }

    /// Shared tip handle for readers outside the acceptor task.
    pub fn tip_handle(&self) -> Arc<RwLock<TipSnapshot>> {
        Arc::clone(&self.tip)
    }

    fn publish_tip(&self) {
        *self.tip.write() = TipSnapshot {
            height: self.prev_block.height(),
            hash: self.prev_block.hash(),
            intermediate_height: self.intermediate.as_ref().map(|b| b.height()),
        };
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round update fan-out
    // ═══════════════════════════════════════════════════════════════════════

    /// Build the round update for the round following the intermediate
    /// block and hand it to the orchestrator.
    fn send_round_update(&mut self) -> Vec<Action> {
        let Some(intermediate) = self.intermediate.as_ref() else {
            warn!("no intermediate block, cannot advance round");
            return Vec::new();
        };
        let update = RoundUpdate {
            round: intermediate.height() + 1,
            prev_hash: intermediate.hash(),
            seed: intermediate.header.seed,
            timestamp: intermediate.header.timestamp,
            provisioners: self.provisioners.clone(),
            bid_list: self.bid_list.clone(),
            last_certificate_step: self.last_certificate.step,
        };
        info!(round = update.round, "sending round update");
        self.sync.on_consensus_resumed();
        vec![Action::EnqueueInternal {
            event: Event::RoundUpdated { update },
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Acceptance
    // ═══════════════════════════════════════════════════════════════════════

    /// Accept a block:
    ///
    /// 1. stateless and linkage checks against the previous block
    /// 2. certificate verification against the current provisioner snapshot
    /// 3. atomic persistence
    /// 4. tip advance, provisioner and bid rotation
    /// 5. accepted-block fan-out and inventory advertising
    ///
    /// Duplicate blocks (same height or hash) are idempotent no-ops.
    pub fn accept_block(&mut self, block: Block) -> Result<Vec<Action>, ChainError> {
        if block.hash() == self.prev_block.hash() || block.height() <= self.prev_block.height() {
            debug!(height = block.height(), hash = %block.hash(), "duplicate block, ignoring");
            return Ok(Vec::new());
        }

        verifiers::check_block(&self.prev_block, &block)?;

        if block.height() > CERT_EXEMPT_HEIGHT {
            verifiers::check_certificate(
                &block,
                &self.prev_block.header.seed,
                &self.provisioners,
                CONSENSUS_MAX_COMMITTEE_SIZE,
                REDUCTION_QUORUM_THRESHOLD,
            )?;
        }

        self.db.store_block(&block)?;

        let height = block.height();
        info!(height, hash = %block.hash(), txs = block.txs.len(), "block accepted");

        self.register_consensus_txs(&block.txs, height);
        self.prev_block = block.clone();

        // Expire stakes and bids from the next round's perspective so the
        // committee for the following block is correct.
        self.provisioners.remove_expired(height + 1);
        self.bid_list.remove_expired(height + 1);

        let evicted = self.candidates.evict_below(height);
        if evicted > 0 {
            debug!(evicted, "evicted obsolete candidate blocks");
        }

        self.publish_tip();

        Ok(vec![
            Action::EmitAcceptedBlock {
                block: block.clone(),
            },
            Action::Broadcast {
                message: OutboundMessage::Inv {
                    block_hash: block.hash(),
                    height,
                },
            },
        ])
    }

    /// Register stake and bid transactions from an accepted block. New
    /// stakes activate two rounds out, reflecting the pipeline depth.
    fn register_consensus_txs(&mut self, txs: &[Transaction], height: u64) {
        for tx in txs {
            match &tx.payload {
                TransactionPayload::Stake {
                    amount,
                    lock,
                    public_key_bls,
                    public_key_ed,
                } => {
                    let start = height + STAKE_ACTIVATION_OFFSET;
                    self.provisioners.add_member(
                        *public_key_bls,
                        *public_key_ed,
                        Stake::new(*amount, start, start + lock),
                    );
                    debug!(height, amount, "registered stake");
                }
                TransactionPayload::Bid { d, m, lock } => {
                    self.bid_list.add_bid(Bid::new(d, m, height + lock));
                    debug!(height, "registered bid");
                }
                _ => {}
            }
        }
    }

    /// Accept the held intermediate block (its certificate was attached at
    /// decision time).
    pub fn finalize_intermediate(&mut self) -> Result<Vec<Action>, ChainError> {
        let intermediate = self
            .intermediate
            .take()
            .ok_or(ChainError::MissingIntermediate)?;
        match self.accept_block(intermediate.clone()) {
            Ok(actions) => Ok(actions),
            Err(e) => {
                // Restore: a failed finalisation aborts this block only.
                self.intermediate = Some(intermediate);
                Err(e)
            }
        }
    }

    /// The agreement collector certified `hash` with `cert`: attach the
    /// certificate to the winning candidate, finalise the previous
    /// intermediate, promote the winner, and advance the round.
    pub fn handle_certificate(&mut self, hash: Hash, cert: Certificate) -> Vec<Action> {
        let Some(candidate) = self.candidates.get(&hash).cloned() else {
            warn!(hash = %hash, "certificate for unknown candidate, awaiting sync");
            return Vec::new();
        };

        let mut winner = candidate;
        winner.header.certificate = cert;
        self.last_certificate = cert;

        let mut actions = Vec::new();
        if self.intermediate.is_some() {
            match self.finalize_intermediate() {
                Ok(finalise_actions) => actions.extend(finalise_actions),
                Err(e) => {
                    warn!(error = %e, "failed to finalise intermediate block");
                    return actions;
                }
            }
        }

        debug!(
            height = winner.height(),
            hash = %winner.hash(),
            "installing intermediate block"
        );
        self.intermediate = Some(winner);
        self.publish_tip();
        actions.extend(self.send_round_update());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Candidates
    // ═══════════════════════════════════════════════════════════════════════

    /// Verify a candidate against the intermediate block. The candidate's
    /// predecessor is the intermediate, never the accepted tip.
    pub fn verify_candidate(&self, block: &Block) -> Result<(), ChainError> {
        verifiers::sanity_check(block)?;
        let intermediate = self
            .intermediate
            .as_ref()
            .ok_or(ChainError::MissingIntermediate)?;
        if block.header.prev_hash != intermediate.hash() {
            return Err(ChainError::VerificationFailed(
                "candidate does not extend the intermediate block",
            ));
        }
        if block.height() != intermediate.height() + 1 {
            return Err(ChainError::VerificationFailed("candidate height mismatch"));
        }
        Ok(())
    }

    /// A candidate arrived: verify and store it for the certificate path.
    pub fn candidate_received(&mut self, block: Block) -> Vec<Action> {
        if let Err(e) = self.verify_candidate(&block) {
            warn!(hash = %block.hash(), error = %e, "discarding candidate");
            return Vec::new();
        }
        debug!(hash = %block.hash(), height = block.height(), "stored candidate");
        self.candidates.insert(block);
        Vec::new()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    fn apply_sync_decision(&mut self, decision: SyncDecision) -> Vec<Action> {
        match decision {
            SyncDecision::None => Vec::new(),
            SyncDecision::StopConsensus => vec![Action::EnqueueInternal {
                event: Event::StopConsensus,
            }],
            SyncDecision::RequestRoundResults { round } => {
                info!(round, "requesting round results");
                vec![Action::RequestRoundResults {
                    round,
                    timeout: ROUND_RESULTS_TIMEOUT,
                }]
            }
        }
    }

    /// A peer announced its height.
    pub fn peer_height(&mut self, height: u64) -> Vec<Action> {
        let decision = self.sync.on_peer_height(height, self.prev_block.height());
        self.apply_sync_decision(decision)
    }

    /// A full block arrived over the sync path. Only processed while
    /// catching up; consensus grows the chain otherwise.
    pub fn block_received(&mut self, block: Block) -> Vec<Action> {
        let current = self.prev_block.height();
        if block.height() <= current {
            debug!(height = block.height(), "stale sync block");
            return Vec::new();
        }
        if !self.sync.is_syncing(current) {
            debug!(height = block.height(), "unsolicited block outside sync");
            return Vec::new();
        }
        if block.height() != current + 1 {
            // Out of order; the peer will be asked again via GetBlocks.
            debug!(
                height = block.height(),
                expected = current + 1,
                "out-of-order sync block"
            );
            return Vec::new();
        }

        // A synced block replaces whatever intermediate we held for its
        // height: the network moved past it.
        if self
            .intermediate
            .as_ref()
            .is_some_and(|b| b.height() == block.height())
        {
            self.intermediate = None;
        }

        let mut actions = match self.accept_block(block) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "sync block rejected");
                return Vec::new();
            }
        };
        let decision = self.sync.on_block_accepted(self.prev_block.height());
        actions.extend(self.apply_sync_decision(decision));
        actions
    }

    /// The round-results query resolved: the response carries the decided
    /// block (certificate attached) for `round`. It becomes the new
    /// intermediate and consensus resumes.
    pub fn round_results_received(&mut self, round: u64, block: Block) -> Vec<Action> {
        if !self.sync.on_round_results(round) {
            debug!(round, "unsolicited round results");
            return Vec::new();
        }
        if block.height() != self.prev_block.height() + 1 || block.height() != round {
            warn!(round, height = block.height(), "round results height mismatch");
            return Vec::new();
        }
        if let Err(e) = verifiers::check_block(&self.prev_block, &block) {
            warn!(round, error = %e, "round results block rejected");
            return Vec::new();
        }
        if let Err(e) = verifiers::check_certificate(
            &block,
            &self.prev_block.header.seed,
            &self.provisioners,
            CONSENSUS_MAX_COMMITTEE_SIZE,
            REDUCTION_QUORUM_THRESHOLD,
        ) {
            warn!(round, error = %e, "round results certificate rejected");
            return Vec::new();
        }

        info!(round, hash = %block.hash(), "round results accepted, resuming consensus");
        self.last_certificate = block.header.certificate;
        self.intermediate = Some(block);
        self.publish_tip();
        self.send_round_update()
    }

    /// The round-results deadline expired. State is unchanged; the request
    /// is re-issued on the next sync observation.
    pub fn round_results_timeout(&mut self, round: u64) -> Vec<Action> {
        if self.sync.on_request_timeout(round) {
            warn!(round, "round results request timed out");
        }
        Vec::new()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rebuild
    // ═══════════════════════════════════════════════════════════════════════

    /// Operator-triggered recovery: stop consensus, wipe the store, reload
    /// genesis, reset provisioners and bids, reinstall the placeholder
    /// intermediate and restart from round 2.
    pub fn rebuild(&mut self) -> Result<Vec<Action>, ChainError> {
        info!("rebuilding chain from genesis");
        let mut actions = vec![
            Action::EnqueueInternal {
                event: Event::StopConsensus,
            },
            Action::ClearDatabase,
        ];

        self.db.clear()?;
        let genesis_block = genesis::block();
        self.db.store_block(&genesis_block)?;

        self.intermediate = Some(genesis::mock_intermediate(&genesis_block));
        self.prev_block = genesis_block;
        self.last_certificate = Certificate::empty();
        self.provisioners = Provisioners::default();
        self.bid_list = BidList::default();
        self.candidates.clear();
        self.sync = Synchroniser::new();
        self.publish_tip();

        actions.extend(self.send_round_update());
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use sba_types::test_utils::{test_keys, test_provisioners};
    use sba_types::{BlockHeader, Seed};

    fn bootstrap(
        provisioners: Provisioners,
    ) -> (Chain, Vec<Action>) {
        Chain::bootstrap(Arc::new(MemoryStore::new()), provisioners, BidList::default()).unwrap()
    }

    fn first_round_update(actions: &[Action]) -> RoundUpdate {
        actions
            .iter()
            .find_map(|a| match a {
                Action::EnqueueInternal {
                    event: Event::RoundUpdated { update },
                } => Some(update.clone()),
                _ => None,
            })
            .expect("round update action")
    }

    fn candidate_on(chain: &Chain, keys: &sba_types::NodeKeys) -> Block {
        let intermediate = chain.intermediate().unwrap();
        let header = BlockHeader {
            version: 0,
            height: intermediate.height() + 1,
            timestamp: intermediate.header.timestamp + 5,
            prev_hash: intermediate.hash(),
            seed: Seed::from_signature(&keys.bls.sign(intermediate.header.seed.as_bytes())),
            generator: keys.bls.public_key(),
            tx_root: Hash::ZERO,
            state_hash: intermediate.header.state_hash,
            hash: Hash::ZERO,
            certificate: Certificate::empty(),
        };
        Block::new(header, Vec::new())
    }

    #[test]
    fn bootstrap_emits_round_two() {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        let (chain, actions) = bootstrap(provisioners);
        let update = first_round_update(&actions);
        assert_eq!(update.round, 2);
        assert_eq!(chain.prev_block().height(), 0);
        assert_eq!(chain.intermediate().unwrap().height(), 1);
    }

    #[test]
    fn candidate_must_extend_intermediate() {
        let (provisioners, keys) = test_provisioners(3, 1000, 1000);
        let (chain, _) = bootstrap(provisioners);

        let good = candidate_on(&chain, &keys[0]);
        assert!(chain.verify_candidate(&good).is_ok());

        // A candidate extending the accepted tip instead is rejected.
        let mut bad_header = good.header.clone();
        bad_header.prev_hash = chain.prev_block().hash();
        bad_header.height = chain.prev_block().height() + 1;
        // Keep the seed consistent with the fake parent.
        bad_header.seed = Seed::from_signature(
            &keys[0]
                .bls
                .sign(chain.prev_block().header.seed.as_bytes()),
        );
        let bad = Block::new(bad_header, Vec::new());
        assert!(matches!(
            chain.verify_candidate(&bad),
            Err(ChainError::VerificationFailed(_))
        ));
    }

    #[test]
    fn accept_is_idempotent() {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        let (mut chain, _) = bootstrap(provisioners);

        // Finalise the mock intermediate (exempt height).
        let actions = chain.finalize_intermediate().unwrap();
        assert!(!actions.is_empty());
        assert_eq!(chain.prev_block().height(), 1);

        // Accepting the same block again is a no-op.
        let again = chain.accept_block(chain.prev_block().clone()).unwrap();
        assert!(again.is_empty());
        assert_eq!(chain.prev_block().height(), 1);
    }

    #[test]
    fn stake_and_bid_rotation() {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        let (mut chain, _) = bootstrap(provisioners);
        let new_staker = test_keys(9);

        // Intermediate carrying a stake and a bid transaction.
        let intermediate = chain.intermediate().unwrap().clone();
        let header = BlockHeader {
            hash: Hash::ZERO,
            tx_root: Hash::ZERO,
            ..intermediate.header.clone()
        };
        let block = Block::new(
            header,
            vec![
                Transaction::stake(
                    700,
                    100,
                    new_staker.bls.public_key(),
                    new_staker.ed.public_key(),
                ),
                Transaction::bid([8; 32], [9; 32], 50),
            ],
        );
        chain.intermediate = Some(block);
        chain.finalize_intermediate().unwrap();

        let height = chain.prev_block().height();
        let member = chain
            .provisioners()
            .get(&new_staker.bls.public_key())
            .expect("staker registered");
        assert_eq!(member.stakes[0].start_height, height + STAKE_ACTIVATION_OFFSET);
        assert_eq!(
            member.stakes[0].end_height,
            height + STAKE_ACTIVATION_OFFSET + 100
        );
        assert_eq!(chain.bid_list().len(), 1);
    }

    #[test]
    fn rebuild_resets_to_genesis() {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        let (mut chain, _) = bootstrap(provisioners);
        chain.finalize_intermediate().unwrap();

        let actions = chain.rebuild().unwrap();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EnqueueInternal { event: Event::StopConsensus })));
        assert!(actions.iter().any(|a| matches!(a, Action::ClearDatabase)));

        assert_eq!(chain.prev_block().height(), 0);
        let intermediate = chain.intermediate().unwrap();
        assert_eq!(intermediate.height(), 1);
        assert!(intermediate.header.seed.is_zero());
        assert_eq!(intermediate.header.timestamp, genesis::GENESIS_TIMESTAMP);
        assert!(chain.provisioners().is_empty());
        assert!(chain.bid_list().is_empty());

        let update = first_round_update(&actions);
        assert_eq!(update.round, 2);
    }

    #[test]
    fn sync_pause_and_fallback() {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        let (mut chain, _) = bootstrap(provisioners);
        chain.finalize_intermediate().unwrap();
        assert_eq!(chain.prev_block().height(), 1);

        // Peer far ahead: consensus pauses.
        let actions = chain.peer_height(4);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EnqueueInternal { event: Event::StopConsensus })));
    }
}
