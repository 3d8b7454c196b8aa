//! End-to-end farms over localhost sockets: the producer thread is the
//! server, worker threads connect as consumers.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use actors::{run_consumer, run_producer};
use config::Args;
use taskfarm_e2e_tests::{expected_items, FarmState, FarmWorker, ItemSource};
use transport::TcpTransport;

/// Run a producer with `workers` consumer threads over an ephemeral
/// localhost port.
fn run_tcp_farm(
    workers: usize,
    items: u32,
    fail_on: Option<&str>,
    state: Arc<FarmState>,
) -> anyhow::Result<ItemSource> {
    let mut producer = TcpTransport::new(&Args::new().with("port", 0))?;
    let port = producer.local_port().expect("producer owns the listener");

    let (ready_tx, ready_rx) = mpsc::channel();
    let mut joins = Vec::new();
    for _ in 0..workers {
        let state = Arc::clone(&state);
        let fail_on = fail_on.map(|s| s.to_string());
        let ready_tx = ready_tx.clone();
        joins.push(thread::spawn(move || -> anyhow::Result<()> {
            let args = Args::new().with("host", "127.0.0.1").with("port", port);
            let mut transport = TcpTransport::new(&args)?;
            ready_tx.send(()).ok();

            let mut task = FarmWorker::new(state);
            task.fail_on = fail_on;
            run_consumer(&mut transport, &mut task)?;
            Ok(())
        }));
    }

    // Wait until every worker holds a connection, so dispatch has the
    // whole pool to choose from.
    for _ in 0..workers {
        ready_rx.recv().expect("worker died before connecting");
    }

    let mut source = ItemSource::new(items);
    run_producer(&mut producer, &mut source)?;

    for join in joins {
        join.join().expect("worker thread panicked")?;
    }
    Ok(source)
}

#[test]
fn five_items_two_workers_over_sockets() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = run_tcp_farm(2, 5, None, Arc::clone(&state))?;

    assert_eq!(state.sorted_consumed(), expected_items(5));
    assert_eq!(*state.shutdowns.lock(), 2);

    // Exactly one statistics report per worker connection.
    assert_eq!(source.worker_reports.len(), 2);
    assert!(source.worker_reports.values().all(|count| *count == 1));
    Ok(())
}

#[test]
fn single_worker_carries_the_whole_farm() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = run_tcp_farm(1, 8, None, Arc::clone(&state))?;

    assert_eq!(state.sorted_consumed(), expected_items(8));
    assert_eq!(*state.shutdowns.lock(), 1);
    assert_eq!(source.worker_reports.len(), 1);
    Ok(())
}

#[test]
fn failed_item_is_isolated_over_sockets() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = run_tcp_farm(1, 5, Some("item-3"), Arc::clone(&state))?;

    let mut expected = expected_items(5);
    expected.retain(|item| item != "item-3");
    assert_eq!(state.sorted_consumed(), expected);
    assert_eq!(*state.failures.lock(), 1);
    assert_eq!(source.worker_reports.len(), 1);
    Ok(())
}

#[test]
fn late_worker_joins_the_pool() -> anyhow::Result<()> {
    // One worker connects up front; a second joins mid-production and
    // is accepted eagerly by the dispatch loop.
    let state = FarmState::new();

    let mut producer = TcpTransport::new(&Args::new().with("port", 0))?;
    let port = producer.local_port().unwrap();

    let spawn_worker = |state: Arc<FarmState>, delay_ms: u64| {
        thread::spawn(move || -> anyhow::Result<()> {
            thread::sleep(std::time::Duration::from_millis(delay_ms));
            let args = Args::new().with("host", "127.0.0.1").with("port", port);
            let mut transport = TcpTransport::new(&args)?;
            let mut task = FarmWorker::new(state);
            run_consumer(&mut transport, &mut task)?;
            Ok(())
        })
    };

    let first = spawn_worker(Arc::clone(&state), 0);
    let second = spawn_worker(Arc::clone(&state), 20);

    // Pace production so it comfortably outlasts the second worker's
    // arrival; a connection in the backlog when production ends would
    // never be accepted.
    let mut source = ItemSource::new(100);
    source.pause = Some(std::time::Duration::from_millis(2));
    run_producer(&mut producer, &mut source)?;

    first.join().unwrap()?;
    second.join().unwrap()?;

    assert_eq!(state.sorted_consumed(), expected_items(100));
    // Both workers were drained, whether or not both got work.
    assert_eq!(source.worker_reports.len(), 2);
    Ok(())
}
