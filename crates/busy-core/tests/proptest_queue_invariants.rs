//! Property-based invariant tests for the busy queue.
//!
//! 1. Queue size always equals the number of identifiers whose most recent
//!    token has not been released; it never goes negative.
//! 2. Releasing a token more than once, or releasing a displaced token,
//!    has no effect on the size.
//! 3. The busy signal never publishes the same value twice in a row.

use std::collections::HashMap;
use std::sync::Arc;

use busy_core::{BusyIndicatorConfiguration, BusyIndicatorService, BusyToken};
use busy_stream::testing::Recorder;
use busy_stream::{Never, Publisher, VirtualScheduler};
use proptest::prelude::*;
use web_time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Enqueue,
    EnqueueId(u8),
    Dequeue(usize),
    Drop(usize),
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Enqueue),
        3 => (0u8..4).prop_map(Op::EnqueueId),
        3 => any::<usize>().prop_map(Op::Dequeue),
        2 => any::<usize>().prop_map(Op::Drop),
        2 => (0u64..150).prop_map(Op::Advance),
    ]
}

/// One enqueue in submission order. `token` is `None` once dropped.
struct Entry {
    identifier: String,
    token: Option<BusyToken>,
    released: bool,
}

/// Later entries displace earlier ones with the same identifier.
fn model_size(entries: &[Entry]) -> usize {
    let mut latest: HashMap<&str, bool> = HashMap::new();
    for entry in entries {
        latest.insert(entry.identifier.as_str(), entry.released);
    }
    latest.values().filter(|released| !**released).count()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Size tracks live work; busy never repeats
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn queue_size_tracks_live_tokens(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let sched = Arc::new(VirtualScheduler::new());
        let service = BusyIndicatorService::with_scheduler(
            BusyIndicatorConfiguration::with_show_delay_ms(100),
            sched.clone(),
        );
        let busy = Recorder::<bool, Never>::unlimited();
        service.busy_indicator().busy().subscribe(busy.clone());

        let mut entries: Vec<Entry> = Vec::new();
        for op in ops {
            match op {
                Op::Enqueue => {
                    let token = service.enqueue();
                    entries.push(Entry {
                        identifier: token.identifier().to_owned(),
                        token: Some(token),
                        released: false,
                    });
                }
                Op::EnqueueId(id) => {
                    let identifier = format!("id-{id}");
                    let token = service.enqueue_with_identifier(identifier.clone());
                    entries.push(Entry { identifier, token: Some(token), released: false });
                }
                Op::Dequeue(i) if !entries.is_empty() => {
                    let len = entries.len();
                    let entry = &mut entries[i % len];
                    if let Some(token) = &entry.token {
                        token.dequeue();
                        token.dequeue();
                        entry.released = true;
                    }
                }
                Op::Drop(i) if !entries.is_empty() => {
                    let len = entries.len();
                    let entry = &mut entries[i % len];
                    entry.token = None;
                    entry.released = true;
                }
                Op::Advance(n) => sched.advance(Duration::from_millis(n)),
                Op::Dequeue(_) | Op::Drop(_) => {}
            }
            sched.run_until_idle();
            prop_assert_eq!(service.queue_size(), model_size(&entries));
        }

        let values = busy.values();
        prop_assert!(values.windows(2).all(|w| w[0] != w[1]), "{:?}", values);
    }
}
