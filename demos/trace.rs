use std::io::Read;
use std::ptr::NonNull;

use tagalloc::{Config, SbrkHeap, TagAllocator, program_break};

/// Waits until the user presses ENTER, when running with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `gdb`, or just watch how the program break moves.
fn block_until_enter_pressed(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn print_alloc(
  size: usize,
  addr: Option<NonNull<u8>>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr.map(NonNull::as_ptr),
    program_break()
  );
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let step = std::env::args().any(|arg| arg == "--step");

  print_program_break("start");

  let config = Config::DEFAULT.with_initial_chunk_size(4096);
  let mut allocator = match TagAllocator::init(SbrkHeap::new(), config) {
    Ok(allocator) => allocator,
    Err(err) => {
      eprintln!("cannot set up the heap: {err}");
      std::process::exit(1);
    }
  };

  print_program_break("after init");
  block_until_enter_pressed(step);

  // 1) A u32 and a 12-byte buffer share the first chunk.
  let first = allocator.allocate(4);
  println!("\n[1] Allocate u32");
  print_alloc(4, first);

  let second = allocator.allocate(12);
  println!("\n[1] Allocate [u8; 12]");
  print_alloc(12, second);
  block_until_enter_pressed(step);

  // 2) Freeing the first block puts it on the free list; a small request
  //    afterwards is served from it instead of growing the heap.
  unsafe { allocator.free(first) };
  let reused = allocator.allocate(2);
  println!("\n[2] Allocate [u8; 2] after freeing the u32");
  print_alloc(2, reused);
  println!(
    "[2] reused the freed block? {}",
    if reused == first { "Yes" } else { "No" }
  );
  block_until_enter_pressed(step);

  // 3) Growing the last block happens in place.
  let Some(grown) = (unsafe { allocator.reallocate(second, 2000) }) else {
    eprintln!("reallocation failed");
    std::process::exit(1);
  };
  println!("\n[3] Reallocate [u8; 12] to 2000 bytes");
  println!(
    "[3] same address? {}",
    if Some(grown) == second { "Yes" } else { "No" }
  );
  block_until_enter_pressed(step);

  // 4) A zeroed array.
  let zeroed = allocator.zero_allocate(16, std::mem::size_of::<u64>());
  println!("\n[4] zero_allocate(16, 8)");
  print_alloc(128, zeroed);
  block_until_enter_pressed(step);

  // 5) A large block moves the program break.
  print_program_break("before large alloc");
  let big = allocator.allocate(64 * 1024);
  println!("\n[5] Allocate large 64 KiB block");
  print_alloc(64 * 1024, big);
  print_program_break("after large alloc");
  block_until_enter_pressed(step);

  // 6) Release everything and dump the heap.
  unsafe {
    allocator.free(reused);
    allocator.free(Some(grown));
    allocator.free(zeroed);
    allocator.free(big);
  }

  println!("\n[6] Heap after freeing everything:");
  match allocator.check_invariants(true) {
    Ok(stats) => println!("[6] {stats:?}"),
    Err(violation) => {
      eprintln!("[6] heap corrupted: {violation}");
      std::process::exit(1);
    }
  }

  println!("\n[7] End of example. The heap is never shrunk; the OS reclaims it at exit.");
}
