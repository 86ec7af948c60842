//! This example installs the allocator as the program's global allocator, see
//! [`mapalloc::Global`] for the actual trait implementation.

use std::thread;

#[global_allocator]
static ALLOCATOR: mapalloc::Global = mapalloc::Global;

fn main() {
    #[cfg(unix)]
    mapalloc::install_exit_hook().expect("could not register the exit sweep");

    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    let p1 = Box::new(2.22);
    let addr_p1 = format!("{:p}", p1);
    println!("P1 Allocated at: {}", addr_p1);

    drop(p1);
    println!("P1 Deallocated");

    let p2 = Box::new(2.22);
    println!("P2 at: {:p} (first fit may hand back P1's block)", p2);

    // Merge example: `b` is released first, so `a` finds it free and absorbs
    // it. Fresh blocks are committed back to back, unless a reservation
    // boundary or earlier frees got in between.
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(b);
    drop(a);

    let c = Box::new([0u8; 8000]);
    if ptr_a == c.as_ptr() {
        println!("Merged block reused at {:p}", c.as_ptr());
    } else {
        println!("Blocks were not adjacent. A was at {:p} and C is at {:p}", ptr_a, c.as_ptr());
    }

    // Thread example
    let t1 = thread::spawn(|| {
        let _ = Box::new(222);
    });

    let t2 = thread::spawn(|| {
        let _ = Box::new(222);
    });

    t1.join().unwrap();
    t2.join().unwrap();

    println!("Outstanding allocations: {}", mapalloc::global().outstanding());
}
