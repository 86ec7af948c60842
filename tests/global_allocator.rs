//! Runs with [`mapalloc::Global`] as the process allocator, so the test
//! harness itself, std's channels and every collection below go through it.

use std::{sync::mpsc, thread};

#[global_allocator]
static ALLOCATOR: mapalloc::Global = mapalloc::Global;

#[repr(align(128))]
struct Padded([u8; 128]);

#[test]
fn channels_and_threads_work() {
    const THREADS: usize = 8;
    const MESSAGES: usize = 200;

    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..THREADS)
        .map(|id| {
            let tx = tx.clone();

            thread::spawn(move || {
                for i in 0..MESSAGES {
                    let payload = vec![id as u8; 16 + i];
                    tx.send((id, payload)).unwrap();
                }
            })
        })
        .collect();

    drop(tx);

    let mut received = vec![0; THREADS];
    for (id, payload) in rx {
        assert!(payload.iter().all(|byte| *byte == id as u8));
        received[id] += 1;
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(received, vec![MESSAGES; THREADS]);
}

#[test]
fn over_aligned_values_are_aligned() {
    let boxes: Vec<_> = (0..32).map(|i| Box::new(Padded([i; 128]))).collect();

    for (i, padded) in boxes.iter().enumerate() {
        assert_eq!(0, &**padded as *const Padded as usize % 128);
        assert!(padded.0.iter().all(|byte| *byte == i as u8));
    }
}

#[test]
fn collections_grow_and_shrink() {
    let mut words = Vec::new();
    for i in 0..1000 {
        words.push(format!("word number {i}"));
    }

    let joined = words.join(" ");
    assert!(joined.ends_with("word number 999"));

    words.truncate(10);
    words.shrink_to_fit();
    assert_eq!(words.capacity(), 10);

    let held = Box::new([7u64; 64]);
    assert!(mapalloc::global().outstanding() > 0);
    assert_eq!(held.iter().sum::<u64>(), 7 * 64);
}
