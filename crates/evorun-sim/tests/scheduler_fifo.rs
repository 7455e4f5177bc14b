mod common;

use std::sync::atomic::Ordering;

use common::{add_experiment, gate_registry, gate_setup, manager};
use evorun_sim::{SchedulerEvent, Status};

#[test]
fn capacity_bounds_the_running_set_and_queues_fifo() {
    let (registry, gate) = gate_registry();
    let (mgr, events) = manager(1);

    let e1 = add_experiment(&mgr, &registry, gate_setup(1));
    let e2 = add_experiment(&mgr, &registry, gate_setup(2));
    let e3 = add_experiment(&mgr, &registry, gate_setup(3));

    mgr.play(e1);
    mgr.play(e2);
    mgr.play(e3);

    // exactly one runs; the rest queue in submission order
    assert_eq!(mgr.running_ids(), vec![e1]);
    assert_eq!(mgr.queued_ids(), vec![e2, e3]);
    assert_eq!(mgr.experiment(e1).unwrap().status(), Status::Running);
    assert_eq!(mgr.experiment(e2).unwrap().status(), Status::Queued);
    assert_eq!(mgr.experiment(e3).unwrap().status(), Status::Queued);

    // playing an already queued experiment is a no-op
    mgr.play(e2);
    assert_eq!(mgr.queued_ids(), vec![e2, e3]);

    gate.store(true, Ordering::Release);
    mgr.wait_idle();

    for id in [e1, e2, e3] {
        assert_eq!(mgr.experiment(id).unwrap().status(), Status::Finished);
    }

    // promotions happened strictly FIFO
    let started: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            SchedulerEvent::StatusChanged {
                id,
                status: Status::Running,
            } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![e1, e2, e3]);
}

#[test]
fn five_experiments_over_two_slots_start_in_order() {
    let (registry, gate) = gate_registry();
    let (mgr, events) = manager(2);

    let ids: Vec<_> = (0..5)
        .map(|i| add_experiment(&mgr, &registry, gate_setup(i)))
        .collect();
    for id in &ids {
        mgr.play(*id);
    }

    assert_eq!(mgr.running_ids(), vec![ids[0], ids[1]]);
    assert_eq!(mgr.queued_ids(), vec![ids[2], ids[3], ids[4]]);

    gate.store(true, Ordering::Release);
    mgr.wait_idle();

    let started: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            SchedulerEvent::StatusChanged {
                id,
                status: Status::Running,
            } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(started, ids);
}

#[test]
fn finished_experiments_free_their_slot_for_the_queue_head() {
    let (registry, gate) = gate_registry();
    let (mgr, _events) = manager(1);

    let e1 = add_experiment(&mgr, &registry, gate_setup(1));
    let e2 = add_experiment(&mgr, &registry, gate_setup(2));
    mgr.play(e1);
    mgr.play(e2);

    gate.store(true, Ordering::Release);
    mgr.wait_idle();

    assert_eq!(mgr.experiment(e1).unwrap().status(), Status::Finished);
    assert_eq!(mgr.experiment(e2).unwrap().status(), Status::Finished);
    assert!(mgr.running_ids().is_empty());
    assert!(mgr.queued_ids().is_empty());
}
