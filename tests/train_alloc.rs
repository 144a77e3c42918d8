use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use memlp::{Activation, Mlp, MlpBuilder, TrainConfig};

struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
    deallocs: AtomicUsize,
    bytes: AtomicUsize,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
            deallocs: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
        self.deallocs.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AllocSnapshot {
        AllocSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            reallocs: self.reallocs.load(Ordering::Relaxed),
            deallocs: self.deallocs.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllocSnapshot {
    allocs: usize,
    reallocs: usize,
    deallocs: usize,
    bytes: usize,
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size(), Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size(), Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.deallocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        // Approximate accounting: record the new size.
        self.bytes.fetch_add(new_size, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

fn make_set(len: usize, input_dim: usize, target_dim: usize) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let features = (0..len)
        .map(|i| {
            let mut row = vec![0.1_f32 * (i % 7) as f32; input_dim];
            row[input_dim - 1] = 1.0;
            row
        })
        .collect();
    let labels = vec![vec![0.25_f32; target_dim]; len];
    (features, labels)
}

#[test]
fn train_allocations_do_not_grow_with_iterations() {
    let input_dim = 33;
    let hidden = 64;
    let output_dim = 8;

    let base = MlpBuilder::new(input_dim)
        .unwrap()
        .add_layer(hidden, Activation::Tanh)
        .unwrap()
        .add_layer(output_dim, Activation::Identity)
        .unwrap()
        .build_with_seed(0)
        .unwrap();

    let (features, labels) = make_set(32, input_dim, output_dim);

    let short = TrainConfig {
        learning_rate: 1e-2,
        max_iterations: 1,
        min_error_cost: 0.0,
        batch_size: 8,
        log_progress: false,
    };
    let long = TrainConfig {
        max_iterations: 50,
        ..short
    };

    for mini_batch in [false, true] {
        let run = |mlp: &mut Mlp, cfg: &TrainConfig| {
            if mini_batch {
                mlp.mini_batch_train(&features, &labels, cfg)
            } else {
                mlp.train(&features, &labels, cfg)
            }
        };

        let mut mlp_short = base.clone();
        ALLOC.reset();
        let before_short = ALLOC.snapshot();
        run(&mut mlp_short, &short).unwrap();
        let alloc_short = ALLOC.alloc_events();
        let after_short = ALLOC.snapshot();

        let mut mlp_long = base.clone();
        ALLOC.reset();
        let before_long = ALLOC.snapshot();
        let report = run(&mut mlp_long, &long).unwrap();
        let alloc_long = ALLOC.alloc_events();
        let after_long = ALLOC.snapshot();

        assert_eq!(report.iterations, 50);
        assert_eq!(
            alloc_short, alloc_long,
            "mini_batch={mini_batch}: allocation event count depends on iterations.\n\
short: before={before_short:?} after={after_short:?}\n\
long: before={before_long:?} after={after_long:?}"
        );
    }
}
