//! End-to-end consensus scenarios on the deterministic simulator.

use sba_consensus::Phase;
use sba_core::Event;
use sba_simulation::{SimConfig, SimulationRunner};
use sba_types::consts::{CONSENSUS_MAX_COMMITTEE_SIZE, REDUCTION_QUORUM_THRESHOLD};
use sba_types::{create_voting_committee, BidList, RoundUpdate, Seed};
use std::time::Duration;

/// Happy path: five equally staked provisioners, three bidders, one round.
/// One candidate wins, both reductions exceed quorum, the agreement
/// certificate carries step 2, and finalisation leaves the accepted tip at
/// height 1 with an intermediate block at height 2.
#[test]
fn happy_path_one_round() {
    let mut sim = SimulationRunner::new(SimConfig::default());
    sim.run_until(Duration::from_secs(8));

    for i in 0..sim.node_count() {
        let chain = sim.node(i).chain();
        assert_eq!(chain.prev_block().height(), 1, "node {i} tip");
        let intermediate = chain.intermediate().expect("intermediate present");
        assert_eq!(intermediate.height(), 2, "node {i} intermediate");
        assert_eq!(chain.last_certificate().step, 2, "node {i} certificate step");

        // The next round is under way.
        assert_eq!(sim.node(i).consensus().round(), 3, "node {i} round");
    }

    // All nodes decided the same block.
    let winner = sim.node(0).chain().intermediate().unwrap().hash();
    for i in 1..sim.node_count() {
        assert_eq!(sim.node(i).chain().intermediate().unwrap().hash(), winner);
    }

    // Both reduction step votes strictly exceed the 75% quorum of the
    // 64-slot committee (48 slots).
    {
        let chain = sim.node(0).chain();
        let cert = *chain.last_certificate();
        let provisioners = chain.provisioners();
        // Committees of round 2 were seeded by the block at height 1.
        let seed = chain.prev_block().header.seed;
        for votes in cert.votes_per_step() {
            let committee = create_voting_committee(
                provisioners,
                &seed,
                2,
                votes.step,
                CONSENSUS_MAX_COMMITTEE_SIZE,
            );
            let quorum = committee.quorum(REDUCTION_QUORUM_THRESHOLD);
            assert_eq!(quorum, 48);
            assert!(
                committee.slots_in_bitset(votes.bitset) > quorum,
                "step {} bitset below quorum",
                votes.step
            );
        }
    }

    // Run the next round to completion: finalising it accepts the block at
    // height 2, whose certificate must verify against the provisioner
    // snapshot. This is the full certificate-checked acceptance path.
    sim.run_until(Duration::from_secs(13));
    for i in 0..sim.node_count() {
        let chain = sim.node(i).chain();
        assert_eq!(chain.prev_block().height(), 2, "node {i} tip after round 3");
        assert!(!chain.prev_block().header.certificate.is_empty());
        assert_eq!(chain.intermediate().unwrap().height(), 3);
    }
}

/// Two identical runs produce identical chains.
#[test]
fn runs_are_deterministic() {
    let mut a = SimulationRunner::new(SimConfig::default());
    let mut b = SimulationRunner::new(SimConfig::default());
    a.run_until(Duration::from_secs(8));
    b.run_until(Duration::from_secs(8));

    for i in 0..a.node_count() {
        assert_eq!(
            a.node(i).chain().prev_block().hash(),
            b.node(i).chain().prev_block().hash()
        );
        assert_eq!(
            a.node(i).chain().intermediate().map(|blk| blk.hash()),
            b.node(i).chain().intermediate().map(|blk| blk.hash())
        );
    }
}

/// No candidate is produced: every phase times out, the step walks through
/// the first iteration into the second, the round is marked failed, and
/// the next round runs with the doubled base timeout.
#[test]
fn timeout_then_catch_up() {
    let config = SimConfig {
        bidders: 0,
        ..SimConfig::default()
    };
    let mut sim = SimulationRunner::new(config);

    // Selection (5s) and first reduction (10s) time out.
    sim.run_until(Duration::from_secs(11));
    assert_eq!(sim.node(0).consensus().step(), 2);

    // Second reduction times out; the agreement wait occupies step 3.
    sim.run_until(Duration::from_secs(16));
    assert_eq!(sim.node(0).consensus().step(), 3);
    assert_eq!(sim.node(0).consensus().phase(), Phase::AgreementWait);

    // The agreement wait expires: round marked failed, next iteration.
    sim.run_until(Duration::from_secs(21));
    assert!(sim.node(0).consensus().round_failed());
    assert_eq!(sim.node(0).consensus().consecutive_failures(), 1);
    assert_eq!(sim.node(0).consensus().step(), 4);
    assert_eq!(sim.node(0).consensus().phase(), Phase::Selection);

    // A subsequent round runs with the doubled base timeout, capped at the
    // threshold.
    let provisioners = sim.node(0).chain().provisioners().clone();
    let update = RoundUpdate {
        round: 3,
        prev_hash: sim.node(0).chain().prev_block().hash(),
        seed: Seed::zero(),
        timestamp: 0,
        provisioners,
        bid_list: BidList::default(),
        last_certificate_step: 0,
    };
    sim.inject(0, Event::RoundUpdated { update }, Duration::ZERO);
    sim.run_for(Duration::from_millis(1));
    assert_eq!(
        sim.node(0).consensus().current_timeout(),
        Duration::from_secs(10)
    );
}

/// Operator rebuild: consensus stops, the database is wiped back to
/// genesis, provisioners and bids reset, a placeholder intermediate block
/// sits at height 1 with a zero seed and the recovery timestamp, and the
/// first new round update carries round 2.
#[test]
fn rebuild_restarts_from_genesis() {
    let mut sim = SimulationRunner::new(SimConfig::default());
    sim.run_until(Duration::from_secs(8));
    assert!(sim.node(0).chain().prev_block().height() >= 1);

    sim.inject(0, Event::RebuildRequested, Duration::ZERO);
    sim.run_for(Duration::from_millis(100));

    let chain = sim.node(0).chain();
    assert_eq!(chain.prev_block().height(), 0);
    assert_eq!(sim.store(0).block_count(), 1);

    let intermediate = chain.intermediate().expect("mock intermediate");
    assert_eq!(intermediate.height(), 1);
    assert!(intermediate.header.seed.is_zero());
    assert_eq!(intermediate.header.timestamp, 1_570_000_000);

    assert!(chain.provisioners().is_empty());
    assert!(chain.bid_list().is_empty());

    // The round update following the rebuild carries round 2.
    assert_eq!(sim.node(0).consensus().round(), 2);
}

/// A sanity check that the provisioner snapshots remain aligned across
/// nodes after a finalised round.
#[test]
fn provisioner_snapshots_stay_aligned() {
    let mut sim = SimulationRunner::new(SimConfig::default());
    sim.run_until(Duration::from_secs(8));

    let reference: Vec<_> = sim
        .node(0)
        .chain()
        .provisioners()
        .iter()
        .map(|p| p.public_key_bls)
        .collect();
    for i in 1..sim.node_count() {
        let other: Vec<_> = sim
            .node(i)
            .chain()
            .provisioners()
            .iter()
            .map(|p| p.public_key_bls)
            .collect();
        assert_eq!(reference, other);
    }
}
