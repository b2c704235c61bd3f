//! The service on its own serial queue thread, with real time.

use std::sync::mpsc;
use std::thread;

use busy_core::{BusyIndicatorConfiguration, BusyIndicatorService};
use busy_stream::PublisherExt;
use web_time::Duration;

const DELAY_MS: u64 = 30;

fn next(rx: &mpsc::Receiver<bool>) -> Option<bool> {
    rx.recv_timeout(Duration::from_secs(2)).ok()
}

#[test]
fn busy_shows_after_delay_and_clears_on_release() {
    let service =
        BusyIndicatorService::new(BusyIndicatorConfiguration::with_show_delay_ms(DELAY_MS));
    let (tx, rx) = mpsc::channel();
    let _guard = service.busy_indicator().busy().for_each(move |busy| {
        let _ = tx.send(busy);
    });
    assert_eq!(next(&rx), Some(false));

    let token = service.enqueue();
    assert_eq!(next(&rx), Some(true));
    assert!(service.busy_indicator().is_busy());

    drop(token);
    assert_eq!(next(&rx), Some(false));
}

#[test]
fn tokens_released_from_other_threads() {
    let service =
        BusyIndicatorService::new(BusyIndicatorConfiguration::with_show_delay_ms(DELAY_MS));
    let (tx, rx) = mpsc::channel();
    let _guard = service.queue().for_each(move |size| {
        let _ = tx.send(size);
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).ok(), Some(0));

    let tokens: Vec<_> = (0..8).map(|i| service.enqueue_with_identifier(format!("w{i}"))).collect();
    let workers: Vec<_> = tokens
        .into_iter()
        .map(|token| thread::spawn(move || token.dequeue()))
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let mut last = None;
    while let Ok(size) = rx.recv_timeout(Duration::from_millis(500)) {
        last = Some(size);
        if size == 0 {
            break;
        }
    }
    assert_eq!(last, Some(0));
    assert_eq!(service.queue_size(), 0);
}

#[test]
fn short_work_stays_hidden() {
    let service = BusyIndicatorService::new(BusyIndicatorConfiguration::with_show_delay_ms(500));
    let (tx, rx) = mpsc::channel();
    let _guard = service.busy_indicator().busy().for_each(move |busy| {
        let _ = tx.send(busy);
    });
    assert_eq!(next(&rx), Some(false));

    let token = service.enqueue();
    token.dequeue();
    assert!(rx.recv_timeout(Duration::from_millis(700)).is_err());
    assert!(!service.busy_indicator().is_busy());
}

#[test]
fn out_of_range_delay_never_shows() {
    let config = BusyIndicatorConfiguration::with_show_delay_ms(u64::MAX);
    let service = BusyIndicatorService::new(config);
    let (tx, rx) = mpsc::channel();
    let _guard = service.busy_indicator().busy().for_each(move |busy| {
        let _ = tx.send(busy);
    });
    assert_eq!(next(&rx), Some(false));

    let token = service.enqueue();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(!service.busy_indicator().is_busy());
    assert_eq!(service.queue_size(), 1);

    drop(token);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(service.queue_size(), 0);
}
