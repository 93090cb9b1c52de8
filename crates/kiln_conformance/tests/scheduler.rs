//! Scheduler properties under real thread interleavings.
//!
//! Every job runs exactly once regardless of worker count and steal timing,
//! concurrent mutual steals never deadlock, and a job group's finishing job
//! runs once after all of its members.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use kiln_conformance::init_test_logging;
use kiln_jobs::{Job, JobGroup, ThreadPool};
use parking_lot::Mutex;
use rand::Rng;

fn counters(n: usize) -> Arc<Vec<AtomicUsize>> {
    Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect())
}

#[test]
fn exactly_once_for_any_worker_count() {
    init_test_logging();
    for workers in 1..=8 {
        let pool = Arc::new(ThreadPool::new(workers).unwrap());
        let hits = counters(300);

        // Half the jobs come from outside the pool, half are spawned by jobs.
        for i in 0..150 {
            let hits = Arc::clone(&hits);
            let inner = Arc::clone(&pool);
            pool.spawn(move || {
                hits[i].fetch_add(1, Ordering::SeqCst);
                let hits = Arc::clone(&hits);
                inner.spawn(move || {
                    hits[150 + i].fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert!(pool.wait_idle_timeout(Duration::from_secs(30)), "workers={workers}");
        for (i, hit) in hits.iter().enumerate() {
            assert_eq!(hit.load(Ordering::SeqCst), 1, "job {i} with {workers} workers");
        }
        assert_eq!(pool.stats().executed(), 300);
    }
}

#[test]
fn mutual_steals_complete_within_bound() {
    init_test_logging();
    let mut rng = rand::thread_rng();
    let pool = Arc::new(ThreadPool::new(8).unwrap());
    let done = Arc::new(AtomicUsize::new(0));
    let mut submitted = 0;

    for _ in 0..200 {
        let size = rng.gen_range(1..16);
        submitted += size;
        let jobs: Vec<Job> = (0..size)
            .map(|_| {
                let done = Arc::clone(&done);
                let spin = rng.gen_range(0..2_000u32);
                Job::new(move || {
                    let mut x = 0u32;
                    for i in 0..spin {
                        x = x.wrapping_add(i);
                    }
                    std::hint::black_box(x);
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        pool.submit_all(jobs);
    }

    assert!(
        pool.wait_idle_timeout(Duration::from_secs(60)),
        "pool did not drain; possible steal deadlock"
    );
    assert_eq!(done.load(Ordering::SeqCst), submitted);
}

#[test]
fn one_heavy_queue_is_spread_by_stealing() {
    let pool = ThreadPool::new(4).unwrap();
    let workers_used = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let jobs: Vec<Job> = (0..40)
        .map(|_| {
            let used = Arc::clone(&workers_used);
            Job::new(move || {
                std::thread::sleep(Duration::from_millis(2));
                used.lock().insert(kiln_jobs::current_worker());
            })
        })
        .collect();
    pool.submit_all(jobs);
    pool.wait_idle();

    assert!(pool.stats().stolen() > 0);
    assert!(workers_used.lock().len() > 1);
}

#[test]
fn group_finisher_runs_once_after_all_members() {
    init_test_logging();
    let pool = ThreadPool::new(5).unwrap();

    for members in [0usize, 1, 7, 64] {
        let finished_members = Arc::new(AtomicUsize::new(0));
        let finisher_runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let seen = Arc::clone(&finished_members);
        let runs = Arc::clone(&finisher_runs);
        let mut group = JobGroup::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            tx.send(seen.load(Ordering::SeqCst)).unwrap();
        });
        for _ in 0..members {
            let count = Arc::clone(&finished_members);
            group.push(move || {
                std::thread::sleep(Duration::from_micros(100));
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        group.submit(&pool);

        let seen_at_finish = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(seen_at_finish, members);
        pool.wait_idle();
        assert_eq!(finisher_runs.load(Ordering::SeqCst), 1, "members={members}");
    }
}

#[test]
fn nested_groups_chain() {
    let pool = Arc::new(ThreadPool::new(3).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    let second_pool = Arc::clone(&pool);
    let second_order = Arc::clone(&order);
    let mut first = JobGroup::new(move || {
        let log = Arc::clone(&second_order);
        let mut second = JobGroup::new(move || {
            log.lock().push("second done");
            tx.send(()).unwrap();
        });
        for _ in 0..3 {
            let log = Arc::clone(&second_order);
            second.push(move || log.lock().push("second member"));
        }
        second.submit(&second_pool);
    });
    for _ in 0..3 {
        let log = Arc::clone(&order);
        first.push(move || log.lock().push("first member"));
    }
    first.submit(&pool);

    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    pool.wait_idle();
    let order = order.lock();
    assert_eq!(order.len(), 7);
    assert!(order[..3].iter().all(|s| *s == "first member"));
    assert!(order[3..6].iter().all(|s| *s == "second member"));
    assert_eq!(order[6], "second done");
}
