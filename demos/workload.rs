//! Exercises the four entry points the way a typical C program would: a
//! pointer-linked tree, zeroed arrays, growing arrays and several threads
//! allocating and releasing at once. Each scenario is timed.

use std::{mem, ptr, thread, time::Instant};

use mapalloc::global;

#[repr(C)]
struct Node {
    value: i32,
    left: *mut Node,
    right: *mut Node,
    padding: [u8; 32],
}

fn allocate_tree(depth: u32, start_value: i32) -> *mut Node {
    if depth == 0 {
        return ptr::null_mut();
    }

    let node = global().allocate(mem::size_of::<Node>()).cast::<Node>();
    if node.is_null() {
        println!("Allocation failed at depth {depth}");
        return node;
    }

    unsafe {
        node.write(Node {
            value: start_value,
            left: allocate_tree(depth - 1, start_value * 2),
            right: allocate_tree(depth - 1, start_value * 2 + 1),
            padding: [0xAB; 32],
        });
    }

    node
}

fn release_tree(node: *mut Node) {
    if node.is_null() {
        return;
    }

    unsafe {
        release_tree((*node).left);
        release_tree((*node).right);
        global().release(node.cast());
    }
}

fn binary_tree(depth: u32) {
    let root = allocate_tree(depth, 1);
    if root.is_null() {
        println!("Allocation failed");
        return;
    }

    println!("Root value: {}", unsafe { (*root).value });
    release_tree(root);
}

fn zeroed_array(count: usize, element_size: usize) {
    let arr = global().zero_allocate(count, element_size);
    if arr.is_null() {
        println!("zero_allocate failed");
        return;
    }

    unsafe {
        println!(
            "Element 0: {}, Element {}: {}",
            *arr,
            count - 1,
            *arr.add((count - 1) * element_size)
        );
        global().release(arr);
    }
}

fn growing_array() {
    let heap = global();

    unsafe {
        let arr = heap.allocate(10 * mem::size_of::<i32>()).cast::<i32>();
        if arr.is_null() {
            println!("Initial allocate failed");
            return;
        }

        for i in 0..10 {
            *arr.add(i) = i as i32 * 10;
        }

        let larger = heap.resize(arr.cast(), 20 * mem::size_of::<i32>()).cast::<i32>();
        if larger.is_null() {
            println!("resize to larger size failed");
            heap.release(arr.cast());
            return;
        }

        for i in 10..20 {
            *larger.add(i) = i as i32 * 10;
        }

        let contents: Vec<i32> = (0..20).map(|i| *larger.add(i)).collect();
        println!("Larger array contents: {contents:?}");

        let fresh = heap.resize(ptr::null_mut(), 5 * mem::size_of::<i32>()).cast::<i32>();
        if fresh.is_null() {
            println!("resize(null) failed");
        } else {
            for i in 0..5 {
                *fresh.add(i) = i as i32 + 100;
            }
            heap.release(fresh.cast());
        }

        heap.release(larger.cast());
    }
}

fn threaded_trees(threads: i32, depth: u32) {
    let handles: Vec<_> = (1..=threads)
        .map(|id| {
            thread::spawn(move || {
                let root = allocate_tree(depth, id * 1000);
                if !root.is_null() {
                    println!("Thread {id}: tree root value = {}", unsafe { (*root).value });
                }
                release_tree(root);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

fn threaded_release(threads: u8, allocs_per_thread: usize) {
    let handles: Vec<_> = (1..=threads)
        .map(|id| {
            thread::spawn(move || {
                let heap = global();
                let mut allocations = Vec::with_capacity(allocs_per_thread);

                for i in 0..allocs_per_thread {
                    let size = (i + 1) * 16;
                    let ptr = heap.allocate(size);
                    if ptr.is_null() {
                        println!("Thread {id}: allocation {i} failed");
                        break;
                    }
                    unsafe { ptr.write_bytes(id, size) };
                    allocations.push(ptr as usize);
                }

                let (even, odd): (Vec<_>, Vec<_>) =
                    allocations.iter().enumerate().partition(|(i, _)| i % 2 == 0);
                for (_, ptr) in even.into_iter().chain(odd) {
                    unsafe { heap.release(*ptr as *mut u8) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

fn timed(name: &str, scenario: impl FnOnce()) {
    let start = Instant::now();
    scenario();
    println!("{name} took {:.3} ms\n", start.elapsed().as_secs_f64() * 1000.0);
}

fn main() {
    #[cfg(unix)]
    mapalloc::install_exit_hook().expect("could not register the exit sweep");

    timed("binary_tree(4)", || binary_tree(4));
    timed("zeroed_array", || zeroed_array(100, mem::size_of::<i32>()));
    timed("growing_array", growing_array);
    timed("threaded_trees", || threaded_trees(4, 3));
    timed("threaded_release", || threaded_release(8, 50));

    println!("Outstanding allocations: {}", global().outstanding());
}
