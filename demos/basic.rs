use segalloc::{BlockPtr, Config, Heap};

fn log_alloc(heap: &Heap<impl segalloc::PageSupplier>, size: usize, bp: Option<BlockPtr>) {
    println!("Requested {size} bytes of memory");
    match bp {
        Some(bp) => println!("Received block {bp} ({} usable bytes)", heap.usable_size(bp)),
        None => println!("Received nothing"),
    }
}

fn main() {
    let mut heap = Heap::in_memory(Config::default()).expect("could not initialize the heap");

    let b1 = heap.allocate(8);
    log_alloc(&heap, 8, b1);

    let b2 = heap.allocate(24);
    log_alloc(&heap, 24, b2);

    let b3 = heap.allocate(300);
    log_alloc(&heap, 300, b3);

    println!("Freeing the first two blocks");
    heap.free(b1);
    heap.free(b2);

    let b4 = heap.allocate(24);
    log_alloc(&heap, 24, b4);

    let b5 = heap.resize(b3, 5000);
    log_alloc(&heap, 5000, b5);

    heap.free(b4);
    heap.free(b5);

    let stats = heap.check().expect("heap is inconsistent");
    println!("{stats:#?}");
}
