#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use busy_core::{BusyIndicatorConfiguration, BusyIndicatorService, BusyToken};
use busy_stream::testing::Recorder;
use busy_stream::{Never, Publisher, VirtualScheduler};
use libfuzzer_sys::fuzz_target;
use web_time::Duration;

#[derive(Arbitrary, Debug)]
enum Op {
    Enqueue,
    EnqueueId(u8),
    Dequeue(u8),
    Drop(u8),
    Advance(u8),
    Run,
}

fuzz_target!(|ops: Vec<Op>| {
    let sched = Arc::new(VirtualScheduler::new());
    let service = BusyIndicatorService::with_scheduler(
        BusyIndicatorConfiguration::with_show_delay_ms(50),
        sched.clone(),
    );
    let busy = Recorder::<bool, Never>::unlimited();
    service.busy_indicator().busy().subscribe(busy.clone());

    let mut tokens: Vec<Option<BusyToken>> = Vec::new();
    for op in ops.into_iter().take(256) {
        match op {
            Op::Enqueue => tokens.push(Some(service.enqueue())),
            Op::EnqueueId(id) => {
                tokens.push(Some(service.enqueue_with_identifier(format!("id-{}", id % 8))));
            }
            Op::Dequeue(i) if !tokens.is_empty() => {
                let len = tokens.len();
                if let Some(token) = &tokens[usize::from(i) % len] {
                    token.dequeue();
                }
            }
            Op::Drop(i) if !tokens.is_empty() => {
                let len = tokens.len();
                tokens[usize::from(i) % len] = None;
            }
            Op::Advance(ms) => sched.advance(Duration::from_millis(u64::from(ms))),
            Op::Run => sched.run_until_idle(),
            Op::Dequeue(_) | Op::Drop(_) => {}
        }
    }

    sched.run_until_idle();
    let live = tokens.iter().flatten().filter(|t| !t.is_dequeued()).count();
    assert_eq!(service.queue_size(), live);

    drop(tokens);
    sched.run_until_idle();
    assert_eq!(service.queue_size(), 0);
    assert!(!service.busy_indicator().is_busy());
    let values = busy.values();
    assert!(values.windows(2).all(|w| w[0] != w[1]));
});
