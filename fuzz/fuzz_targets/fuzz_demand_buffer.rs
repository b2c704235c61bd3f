#![no_main]

use arbitrary::Arbitrary;
use busy_stream::testing::Recorder;
use busy_stream::{Completion, Demand, DemandBuffer, Never};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Push(u16),
    Request(u8),
    RequestUnlimited,
    Complete,
}

fuzz_target!(|input: (u8, Vec<Op>)| {
    let (per_value, ops) = input;
    let rec = Recorder::<u16, Never>::new(Demand::NONE)
        .with_per_value(Demand::max(u64::from(per_value % 3)));
    let buffer = DemandBuffer::new(rec.clone());

    let mut pushed = 0usize;
    let mut completed = false;
    for op in ops.into_iter().take(512) {
        match op {
            Op::Push(v) if !completed => {
                buffer.push(v);
                pushed += 1;
            }
            Op::Request(n) => {
                buffer.request_more(Demand::max(u64::from(n)));
            }
            Op::RequestUnlimited => {
                buffer.request_more(Demand::Unlimited);
            }
            Op::Complete if !completed => {
                buffer.complete(Completion::Finished);
                completed = true;
            }
            Op::Push(_) | Op::Complete => {}
        }
        let state = buffer.demand_state();
        assert!(state.processed <= state.requested);
        assert!(rec.values().len() <= pushed);
    }

    if rec.completion().is_some() {
        assert_eq!(rec.values().len(), pushed);
        assert_eq!(buffer.buffered(), 0);
    }
});
