use segalloc::{Config, Heap};

fn main() {
    let mut heap = Heap::mapped(Config::default()).expect("could not reserve the heap");
    let base = heap.supplier().base().as_ptr();

    let block1 = heap.allocate(4).expect("out of memory");
    println!("{:?}", base.wrapping_add(block1.offset()));
    let block2 = heap.allocate(4).expect("out of memory");
    println!("{:?}", base.wrapping_add(block2.offset()));

    println!("Deallocating block1");
    heap.free(block1);

    let block3 = heap.allocate(4).expect("out of memory");
    println!("Should be first addr {:?}", base.wrapping_add(block3.offset()));
}
