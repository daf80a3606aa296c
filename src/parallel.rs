use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Maps items with `produce` on `num_threads` workers and feeds the results to
/// `consume` on the calling thread, in the order of the input iterator.
///
/// At most `2 * num_threads` results are in flight ahead of the consumer.
/// The consumer stops the processing early by returning `ControlFlow::Break`
/// or an error. Items that were already taken by a worker are completed, and
/// their results are dropped. A panic in `produce` stops the processing and
/// is reported as `Error::WorkerPanicked`.
pub fn parallel_process<Iter, Item, Producer, Data, Consumer>(
    iter: Iter,
    num_threads: usize,
    produce: Producer,
    mut consume: Consumer,
) -> Result<()>
where
    Iter: Iterator<Item = Item> + Send,
    Producer: Fn(Item) -> Data + Sync,
    Data: Send,
    Consumer: FnMut(Data) -> Result<ControlFlow<()>>,
{
    let num_threads = num_threads.max(1);

    let iter = Mutex::new(iter.enumerate());
    let next = (Mutex::new(2 * num_threads), Condvar::new());
    let stopped = AtomicBool::new(false);

    let stop = || {
        stopped.store(true, Ordering::SeqCst);
        // release all workers waiting for their turn
        let mut guard = next.0.lock();
        *guard = usize::MAX;
        next.1.notify_all();
    };

    crossbeam::scope(|s| {
        let (sender, receiver) = sync_channel(2 * num_threads);
        for _ in 0..num_threads {
            let sender = sender.clone();
            let (iter, next, stopped, produce, stop) = (&iter, &next, &stopped, &produce, &stop);
            s.spawn(move |_| loop {
                let (i, item) = {
                    let mut iter = iter.lock();
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    match iter.next() {
                        None => break,
                        Some(x) => x,
                    }
                };

                // `None` marks a panicked producer
                let data = panic::catch_unwind(AssertUnwindSafe(|| produce(item))).ok();
                if data.is_none() {
                    stop();
                }

                let (counter, cond) = next;
                {
                    let mut guard = counter.lock();
                    while *guard <= i {
                        cond.wait(&mut guard);
                    }
                }

                let panicked = data.is_none();
                if sender.send((i, data)).is_err() || panicked {
                    break;
                }
            });
        }
        drop(sender); // drop to make sure iteration will finish once all senders are out of scope

        let mut pending = BTreeMap::new();
        let mut next_idx = 0;
        let mut result = Ok(());
        let mut done = false;
        for (i, data) in receiver.iter() {
            if done {
                // drain results of in-flight items
                continue;
            }
            let data = match data {
                Some(data) => data,
                None => {
                    result = Err(Error::WorkerPanicked);
                    done = true;
                    continue;
                }
            };
            if stopped.load(Ordering::SeqCst) {
                continue;
            }
            pending.insert(Reverse(i), data);
            while let Some(data) = pending.remove(&Reverse(next_idx)) {
                {
                    let mut guard = next.0.lock();
                    *guard = guard.saturating_add(1);
                    next.1.notify_all();
                }

                next_idx += 1;
                match consume(data) {
                    Ok(ControlFlow::Continue(())) => (),
                    Ok(ControlFlow::Break(())) => {
                        done = true;
                        stop();
                        break;
                    }
                    Err(e) => {
                        result = Err(e);
                        done = true;
                        stop();
                        break;
                    }
                }
            }
        }
        result
    })
    .map_err(|_| Error::WorkerPanicked)?
}
