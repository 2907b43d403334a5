//! End-to-end reservoir engine tests over worker groups.

use reservoir::{run_group, AmsSelectMulti, GatherReservoir, Reservoir};

const K: usize = 50;

fn engine(comm: &reservoir::Communicator, seed: u64, k: usize) -> Reservoir<u32, AmsSelectMulti<8>> {
    let np = comm.num_workers() as u64;
    let selector = AmsSelectMulti::<8>::new(comm.clone(), seed + np + comm.rank() as u64);
    Reservoir::new(comm.clone(), selector, k, seed)
}

/// Unit-weight batches with globally unique ids.
fn batch(rank: usize, round: u64, count: usize) -> Vec<(f64, u32)> {
    (0..count)
        .map(|i| (1.0, (rank * 1_000_000) as u32 + round as u32 * 10_000 + i as u32))
        .collect()
}

#[test]
fn reservoir_sizes_converge_to_k() {
    const WORKERS: usize = 3;
    const BATCH: usize = 40;

    run_group(WORKERS, |comm| {
        let mut res = engine(&comm, 1234, K);
        let mut seen = 0i64;
        for round in 0..20 {
            res.insert_batch(&batch(comm.rank(), round, BATCH)).unwrap();
            seen += (WORKERS * BATCH) as i64;

            assert!(res.len() <= K, "worker holds more than k");
            let total = comm.all_reduce_sum(res.len() as i64).unwrap();
            assert_eq!(total, seen.min(K as i64), "round {round}");

            // Every surviving key is at or below the advertised threshold.
            if res.threshold() > 0.0 {
                let local_max = res.tree().last_key().unwrap_or(0.0);
                assert!(local_max <= res.threshold());
            }
        }
    });
}

#[test]
fn sample_visits_keys_in_order() {
    run_group(2, |comm| {
        let mut res = engine(&comm, 77, K);
        for round in 0..5 {
            res.insert_batch(&batch(comm.rank(), round, 500)).unwrap();
        }
        let mut keys = Vec::new();
        res.sample(|key, _| keys.push(key));
        assert_eq!(keys.len(), res.len());
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    });
}

#[test]
fn engine_is_deterministic_for_fixed_seed() {
    const WORKERS: usize = 2;

    let run = || {
        run_group(WORKERS, |comm| {
            let mut res = engine(&comm, 4321, K);
            for round in 0..8 {
                res.insert_batch(&batch(comm.rank(), round, 300)).unwrap();
            }
            let mut keys = Vec::new();
            res.sample(|key, _| keys.push(key.to_bits()));
            (keys, res.threshold().to_bits())
        })
    };
    assert_eq!(run(), run());
}

#[test]
fn gather_baseline_keeps_k_at_root() {
    const WORKERS: usize = 3;

    run_group(WORKERS, |comm| {
        let mut res = GatherReservoir::new(comm.clone(), K, 99);
        for round in 0..6 {
            res.insert_batch(&batch(comm.rank(), round, 200)).unwrap();
        }
        let mut count = 0;
        let mut max_key: f64 = 0.0;
        res.sample(|key, _| {
            count += 1;
            max_key = max_key.max(key);
        });
        if comm.rank() == 0 {
            assert_eq!(count, K);
            assert!(res.threshold() > 0.0);
            assert_eq!(max_key, res.threshold());
        } else {
            assert_eq!(count, 0);
        }
    });
}

/// Inclusion fairness: with weights 3 : 1, the long-run inclusion
/// probability of the heavy id must converge to 3/4.
#[test]
fn weighted_inclusion_is_proportional() {
    const WORKERS: usize = 2;
    const SEEDS: u64 = 200;
    const PER_BATCH: usize = 1000;
    const BATCHES: u64 = 2;

    let mut heavy = 0u64;
    let mut total = 0u64;
    for seed in 0..SEEDS {
        let picks = run_group(WORKERS, move |comm| {
            let mut res = engine(&comm, 100_000 + seed * 17, 2);
            // Alternate light (id 0, weight 1) and heavy (id 1, weight 3).
            let items: Vec<(f64, u32)> = (0..PER_BATCH)
                .map(|i| if i % 2 == 0 { (1.0, 0u32) } else { (3.0, 1u32) })
                .collect();
            for _ in 0..BATCHES {
                res.insert_batch(&items).unwrap();
            }
            let mut ids = Vec::new();
            res.sample(|_, id| ids.push(id));
            comm.gather(0, ids).unwrap()
        });
        if let Some(all) = &picks[0] {
            for id in all.iter().flatten() {
                total += 1;
                heavy += u64::from(*id == 1);
            }
        }
    }

    assert_eq!(total, 2 * SEEDS, "reservoir must hold exactly k = 2 per run");
    let frac = heavy as f64 / total as f64;
    assert!(
        (frac - 0.75).abs() < 0.1,
        "heavy-item inclusion {frac} too far from 0.75"
    );
}
