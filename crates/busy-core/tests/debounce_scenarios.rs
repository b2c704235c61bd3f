//! End-to-end busy signal timing on a virtual clock.

use std::sync::Arc;

use busy_core::{BusyIndicatorConfiguration, BusyIndicatorService, BusyQueue};
use busy_stream::testing::Recorder;
use busy_stream::{Never, Publisher, VirtualScheduler};
use web_time::Duration;

const DELAY_MS: u64 = 100;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

struct Harness {
    sched: Arc<VirtualScheduler>,
    service: BusyIndicatorService,
    busy: Arc<Recorder<bool, Never>>,
}

fn harness() -> Harness {
    let sched = Arc::new(VirtualScheduler::new());
    let service = BusyIndicatorService::with_scheduler(
        BusyIndicatorConfiguration::with_show_delay_ms(DELAY_MS),
        sched.clone(),
    );
    sched.run_until_idle();
    let busy = Recorder::unlimited();
    service.busy_indicator().busy().subscribe(busy.clone());
    Harness {
        sched,
        service,
        busy,
    }
}

#[test]
fn short_work_never_shows_busy() {
    let h = harness();
    let token = h.service.enqueue();
    h.sched.advance(ms(50));
    token.dequeue();
    h.sched.advance(ms(500));
    assert_eq!(h.busy.values(), vec![false]);
}

#[test]
fn long_work_shows_then_hides() {
    let h = harness();
    let token = h.service.enqueue();
    h.sched.advance(ms(99));
    assert_eq!(h.busy.values(), vec![false]);
    h.sched.advance(ms(51));
    assert_eq!(h.busy.values(), vec![false, true]);
    token.dequeue();
    h.sched.run_until_idle();
    assert_eq!(h.busy.values(), vec![false, true, false]);
}

#[test]
fn overlapping_work_publishes_one_true() {
    let h = harness();
    let a = h.service.enqueue();
    h.sched.advance(ms(60));
    let b = h.service.enqueue();
    h.sched.advance(ms(60));
    drop(a);
    h.sched.advance(ms(60));
    let c = h.service.enqueue();
    h.sched.advance(ms(60));
    drop(b);
    drop(c);
    h.sched.run_until_idle();
    assert_eq!(h.busy.values(), vec![false, true, false]);
}

#[test]
fn brief_gap_between_jobs_restarts_delay() {
    let h = harness();
    let first = h.service.enqueue();
    h.sched.advance(ms(80));
    drop(first);
    h.sched.run_until_idle();
    let second = h.service.enqueue();
    h.sched.advance(ms(80));
    assert_eq!(h.busy.values(), vec![false]);
    h.sched.advance(ms(20));
    assert_eq!(h.busy.values(), vec![false, true]);
    drop(second);
    h.sched.run_until_idle();
}

#[test]
fn identifier_membership_is_immediate_and_displacing() {
    let h = harness();
    let job = Recorder::<bool, Never>::unlimited();
    h.service
        .busy_indicator()
        .busy_for("job")
        .subscribe(job.clone());

    let first = h.service.enqueue_with_identifier("job");
    h.sched.run_until_idle();
    assert_eq!(job.values(), vec![false, true]);

    let second = h.service.enqueue_with_identifier("job");
    h.sched.run_until_idle();
    assert!(first.is_dequeued());
    first.dequeue();
    h.sched.run_until_idle();
    assert_eq!(job.values(), vec![false, true]);

    second.dequeue();
    h.sched.run_until_idle();
    assert_eq!(job.values(), vec![false, true, false]);
    // Membership has no debounce, the global signal never got to show.
    assert_eq!(h.busy.values(), vec![false]);
}

#[test]
fn dropped_token_dequeues_exactly_once() {
    let h = harness();
    let sizes = Recorder::<usize, Never>::unlimited();
    h.service.queue().subscribe(sizes.clone());
    {
        let _token = h.service.enqueue_with_identifier("scoped");
        h.sched.run_until_idle();
    }
    h.sched.run_until_idle();
    assert_eq!(sizes.values(), vec![0, 1, 0]);
    assert_eq!(h.service.queue_size(), 0);
}

#[test]
fn service_is_usable_through_trait_object() {
    let h = harness();
    let queue: &dyn BusyQueue = &h.service;
    let token = queue.enqueue_with_identifier("dyn");
    h.sched.run_until_idle();
    assert_eq!(token.identifier(), "dyn");
    assert_eq!(h.service.queue_size(), 1);
    drop(token);
    h.sched.run_until_idle();
    assert_eq!(h.service.queue_size(), 0);
}

#[test]
fn cancelled_subscriber_stops_receiving() {
    let h = harness();
    let token = h.service.enqueue();
    h.busy.cancel();
    h.sched.advance(ms(200));
    assert_eq!(h.busy.values(), vec![false]);
    assert!(h.service.busy_indicator().is_busy());
    drop(token);
    h.sched.run_until_idle();
    assert!(!h.service.busy_indicator().is_busy());
}

#[test]
fn unbounded_show_delay_never_shows_busy() {
    let sched = Arc::new(VirtualScheduler::new());
    let service = BusyIndicatorService::with_scheduler(
        BusyIndicatorConfiguration::with_show_delay(Duration::MAX),
        sched.clone(),
    );
    let busy = Recorder::<bool, Never>::unlimited();
    service.busy_indicator().busy().subscribe(busy.clone());
    let token = service.enqueue();
    sched.advance(ms(3_600_000));
    assert_eq!(busy.values(), vec![false]);
    drop(token);
    sched.run_until_idle();
    assert_eq!(busy.values(), vec![false]);
    assert_eq!(service.queue_size(), 0);
}
