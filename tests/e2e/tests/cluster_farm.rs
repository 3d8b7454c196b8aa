//! End-to-end farms over the in-process cluster world: every rank is a
//! thread, the communicator is the in-memory mailbox substrate.

use std::sync::Arc;
use std::thread;

use actors::{run_consumer, run_producer, run_writer};
use config::Args;
use taskfarm_e2e_tests::{expected_items, FarmState, FarmWorker, FarmWriter, ItemSource};
use transport::cluster::ChannelCommunicator;
use transport::{MpiTransport, Transport};

fn spawn_farm(
    world_size: usize,
    args: Args,
    items: u32,
    make_worker: impl Fn(usize, Arc<FarmState>) -> FarmWorker + Send + Sync + 'static,
    state: Arc<FarmState>,
) -> anyhow::Result<ItemSource> {
    let mut comms: Vec<_> = ChannelCommunicator::world(world_size)
        .into_iter()
        .map(Arc::new)
        .collect();

    // Pop nonzero ranks from the top; rank 0 stays for the producer.
    let make_worker = Arc::new(make_worker);
    let mut joins = Vec::new();
    for rank in (1..world_size).rev() {
        let comm = comms.remove(rank);
        let args = args.clone();
        let state = Arc::clone(&state);
        let make_worker = Arc::clone(&make_worker);
        joins.push(thread::spawn(move || -> anyhow::Result<()> {
            let mut transport = MpiTransport::with_comm(&args, comm)?;
            if transport.is_writer() {
                let mut task = FarmWriter {
                    state: Arc::clone(&state),
                };
                run_writer(&mut transport, &mut task)?;
            } else {
                let mut task = make_worker(rank, state);
                run_consumer(&mut transport, &mut task)?;
            }
            Ok(())
        }));
    }

    let mut source = ItemSource::new(items);
    let mut transport = MpiTransport::with_comm(&args, comms.remove(0))?;
    run_producer(&mut transport, &mut source)?;

    for join in joins {
        join.join().expect("peer thread panicked")?;
    }
    Ok(source)
}

#[test]
fn five_items_two_workers() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = spawn_farm(
        3,
        Args::new(),
        5,
        |_, state| FarmWorker::new(state),
        Arc::clone(&state),
    )?;

    // Every item consumed exactly once, no duplicates, no drops.
    assert_eq!(state.sorted_consumed(), expected_items(5));

    // Both workers shut down and reported exactly once.
    assert_eq!(*state.shutdowns.lock(), 2);
    assert_eq!(source.worker_reports.len(), 2);
    assert!(source.worker_reports.values().all(|count| *count == 1));
    assert!(source.writer_reports.is_empty());
    Ok(())
}

#[test]
fn failed_item_is_isolated() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = spawn_farm(
        2,
        Args::new(),
        5,
        |_, state| {
            let mut worker = FarmWorker::new(state);
            worker.fail_on = Some("item-3".to_string());
            worker
        },
        Arc::clone(&state),
    )?;

    // Items 4 and 5 still made it through the same worker.
    let mut expected = expected_items(5);
    expected.retain(|item| item != "item-3");
    assert_eq!(state.sorted_consumed(), expected);
    assert_eq!(*state.failures.lock(), 1);
    assert_eq!(source.worker_reports.len(), 1);
    Ok(())
}

#[test]
fn writer_receives_sessions_and_reports() -> anyhow::Result<()> {
    // 4 ranks, 1 writer: stride 4 puts the writer at rank 3; ranks 1
    // and 2 are workers streaming each item through a session.
    let state = FarmState::new();
    let source = spawn_farm(
        4,
        Args::new().with("writers", 1),
        4,
        |_, state| {
            let mut worker = FarmWorker::new(state);
            worker.write_to = Some(1);
            worker
        },
        Arc::clone(&state),
    )?;

    assert_eq!(state.sorted_consumed(), expected_items(4));

    // One OPEN/WRITE/CLOSE triple per item.
    assert_eq!(*state.opens.lock(), 4);
    assert_eq!(*state.closes.lock(), 4);
    let mut written = state.writes.lock().clone();
    written.sort();
    assert_eq!(written, expected_items(4));

    // Two worker reports, one writer report, each exactly once.
    assert_eq!(source.worker_reports.len(), 2);
    assert_eq!(source.writer_reports.len(), 1);
    assert!(source.writer_reports.values().all(|count| *count == 1));
    Ok(())
}

#[test]
fn drain_accounts_for_every_worker_exactly_once() -> anyhow::Result<()> {
    let state = FarmState::new();
    let source = spawn_farm(
        5,
        Args::new(),
        12,
        |_, state| FarmWorker::new(state),
        Arc::clone(&state),
    )?;

    assert_eq!(state.sorted_consumed(), expected_items(12));
    assert_eq!(source.worker_reports.len(), 4);
    assert!(source.worker_reports.values().all(|count| *count == 1));
    assert_eq!(*state.shutdowns.lock(), 4);
    Ok(())
}
