mod common;

use common::{FailingCodec, FakeCodec, FlatCodec};
use netdict::{
    build, NetDictError, PacketRecord, PoolConfig, PoolKind, PoolSet, SearchMode, TrialConfig,
    TrialSearch,
};

fn search_config(seed: u64) -> TrialConfig {
    TrialConfig {
        dictionary_size: 256,
        trials: 5,
        generations: 4,
        randomness_percent: 40,
        seed,
        ..TrialConfig::default()
    }
}

fn small_pools() -> PoolConfig {
    PoolConfig {
        budget_multiplier: 4,
        ..PoolConfig::default()
    }
}

fn filled_pools(trial: &TrialConfig, packets: Vec<PacketRecord>) -> PoolSet {
    let mut pools = PoolSet::new(trial, &small_pools());
    pools.read_all(packets.into_iter().map(Ok), 1).unwrap();
    pools
}

#[test]
fn identical_inputs_give_identical_dictionaries() {
    let trial = search_config(42);
    let codec = FakeCodec::default();
    let dir = tempfile::tempdir().unwrap();

    let mut fingerprints = Vec::new();
    for run in 0..2 {
        let pools = filled_pools(&trial, common::random_packets(5, 300));
        assert!(!pools.trainer_overflow.is_empty());
        let outcome = TrialSearch::new(&trial, &pools, &codec).run().unwrap();
        assert_eq!(outcome.mode, SearchMode::Generations);
        let dict = build(&codec, &outcome.selection, &pools, &trial, &dir.path().join(format!("{run}.ndic"))).unwrap();
        fingerprints.push((outcome.selection.members.clone(), dict.fingerprint()));
    }
    assert_eq!(fingerprints[0], fingerprints[1]);
}

#[test]
fn carried_score_never_decreases() {
    let codec = FakeCodec::default();
    for seed in 0..6 {
        let trial = search_config(seed);
        let pools = filled_pools(&trial, common::random_packets(100 + seed, 300));
        let outcome = TrialSearch::new(&trial, &pools, &codec).run().unwrap();

        assert_eq!(outcome.history.len(), trial.generations);
        for pair in outcome.history.windows(2) {
            assert!(pair[1].carried_score >= pair[0].carried_score);
        }
        for g in &outcome.history {
            if g.improved {
                assert_eq!(g.carried_score, g.winning_score);
            } else {
                assert!(g.carried_score >= g.winning_score);
            }
            assert!(outcome.selection.bytes <= pools.dictionary.capacity());
        }
    }
}

#[test]
fn randomness_shrinks_across_generations() {
    let trial = TrialConfig {
        randomness_percent: 80,
        randomness_decay_percent: 50,
        ..search_config(7)
    };
    let pools = filled_pools(&trial, common::random_packets(8, 300));
    let outcome = TrialSearch::new(&trial, &pools, &FakeCodec::default())
        .run()
        .unwrap();
    let schedule: Vec<u32> = outcome.history.iter().map(|g| g.randomness_percent).collect();
    assert_eq!(schedule, vec![80, 40, 20, 10]);
}

#[test]
fn ties_go_to_the_earliest_trial() {
    let trial = search_config(3);
    let pools = filled_pools(&trial, common::random_packets(9, 300));
    let outcome = TrialSearch::new(&trial, &pools, &FlatCodec).run().unwrap();
    for g in &outcome.history {
        assert_eq!(g.winning_trial, 0);
        assert!(!g.improved);
    }
    assert_eq!(outcome.selection.members, (0..pools.dictionary.len()).collect::<Vec<_>>());
}

#[test]
fn all_trials_failing_exhausts_the_search() {
    let trial = search_config(1);
    let pools = filled_pools(&trial, common::random_packets(10, 300));
    let codec = FailingCodec::default();
    let err = TrialSearch::new(&trial, &pools, &codec).run().unwrap_err();
    match err {
        NetDictError::SearchExhausted { generation, trials } => {
            assert_eq!(generation, 1);
            assert_eq!(trials, 5);
        }
        other => panic!("expected SearchExhausted, got {other:?}"),
    }
    // Baseline plus the five trials of generation 1.
    assert_eq!(codec.calls.borrow().len(), 6);
}

#[test]
fn no_trials_is_a_single_pass_over_the_pool() {
    let trial = TrialConfig {
        no_trials: true,
        ..search_config(1)
    };
    let pools = filled_pools(&trial, common::random_packets(11, 20));
    let codec = FakeCodec::default();
    let outcome = TrialSearch::new(&trial, &pools, &codec).run().unwrap();
    assert_eq!(outcome.mode, SearchMode::SinglePass);
    assert!(outcome.history.is_empty());
    assert_eq!(outcome.selection.len(), 20);
    assert_eq!(codec.train_calls.get(), 0);
}

#[test]
fn empty_test_pool_falls_back_to_single_pass() {
    let trial = search_config(2);
    let mut pools = PoolSet::new(&trial, &small_pools());
    for p in common::random_packets(12, 10) {
        pools.classify(p, PoolKind::Dictionary);
    }
    for p in common::random_packets(13, 10) {
        pools.classify(p, PoolKind::TrainerOverflow);
    }
    let outcome = TrialSearch::new(&trial, &pools, &FakeCodec::default())
        .run()
        .unwrap();
    assert_eq!(outcome.mode, SearchMode::SinglePass);
}
