//! Workload traces.
//!
//! A trace is a recorded sequence of allocator requests used to benchmark and
//! validate an allocator. The text format starts with four header numbers,
//! one per line, followed by one request per line:
//!
//! ```text
//! 20000        suggested heap size (ignored)
//! 3            number of distinct ids
//! 5            number of requests
//! 1            weight of the trace (ignored)
//! a 0 512      allocate 512 bytes for id 0
//! a 1 128
//! r 0 640      resize the block of id 0 to 640 bytes
//! f 1          free the block of id 1
//! f 0
//! ```
//!
//! Replaying a trace checks more than the allocator's own invariants: every
//! payload is stamped with a pattern derived from its id, and the pattern is
//! verified when the block is resized or freed, so blocks that overlap or data
//! lost while moving a block are caught right away.

use std::{mem, ops::Range, str::FromStr};

use log::debug;

use crate::{
    arena::PageSupplier,
    block::{ALIGNMENT, BlockPtr},
    error::TraceError,
    heap::Heap,
};

/// One request of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc { id: usize, size: usize },
    Resize { id: usize, size: usize },
    Free { id: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub suggested_heap: usize,
    pub ids: usize,
    pub weight: usize,
    pub ops: Vec<Op>,
}

/// Outcome of a successful replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStats {
    pub ops: usize,
    /// Largest amount of requested bytes live at the same time.
    pub peak_payload: usize,
    /// Size of the heap once the trace finished.
    pub heap_size: usize,
    /// `peak_payload / heap_size`.
    pub utilization: f64,
}

impl FromStr for Trace {
    type Err = TraceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let mut header = [0; 4];
        for value in header.iter_mut() {
            let (line, text) = lines.next().ok_or_else(|| TraceError::Parse {
                line: 0,
                message: "truncated header".into(),
            })?;
            *value = number(line, text)?;
        }

        let [suggested_heap, ids, expected_ops, weight] = header;

        // Every id needs at least one request to be of any use.
        if ids > expected_ops.saturating_mul(2) {
            return Err(TraceError::Parse {
                line: 2,
                message: format!("{ids} ids declared for only {expected_ops} ops"),
            });
        }

        let mut ops = Vec::with_capacity(expected_ops.min(1 << 16));

        for (line, text) in lines {
            let op = parse_op(line, text)?;

            let id = match op {
                Op::Alloc { id, .. } | Op::Resize { id, .. } | Op::Free { id } => id,
            };

            if id >= ids {
                return Err(TraceError::Parse {
                    line,
                    message: format!("id {id} out of range, trace declares {ids} ids"),
                });
            }

            ops.push(op);
        }

        if ops.len() != expected_ops {
            return Err(TraceError::Parse {
                line: 4,
                message: format!("trace declares {expected_ops} ops but has {}", ops.len()),
            });
        }

        Ok(Self {
            suggested_heap,
            ids,
            weight,
            ops,
        })
    }
}

fn number(line: usize, text: &str) -> Result<usize, TraceError> {
    text.parse().map_err(|_| TraceError::Parse {
        line,
        message: format!("expected a number, found {text:?}"),
    })
}

fn parse_op(line: usize, text: &str) -> Result<Op, TraceError> {
    let mut fields = text.split_whitespace();
    let kind = fields.next().unwrap_or_default();

    let mut field = || {
        fields
            .next()
            .ok_or_else(|| TraceError::Parse {
                line,
                message: format!("missing field in {text:?}"),
            })
            .and_then(|field| number(line, field))
    };

    let op = match kind {
        "a" => Op::Alloc {
            id: field()?,
            size: field()?,
        },
        "r" => Op::Resize {
            id: field()?,
            size: field()?,
        },
        "f" => Op::Free { id: field()? },
        other => {
            return Err(TraceError::Parse {
                line,
                message: format!("unknown request {other:?}"),
            });
        }
    };

    Ok(op)
}

/// Byte `index` of the payload of `id`.
#[inline]
fn stamp(id: usize, index: usize) -> u8 {
    (id as u8).wrapping_mul(31).wrapping_add(index as u8)
}

/// A live block of the replay.
#[derive(Clone, Copy)]
struct Live {
    ptr: BlockPtr,
    size: usize,
}

impl Live {
    fn range(&self) -> Range<usize> {
        self.ptr.offset()..self.ptr.offset() + self.size
    }
}

/// What an id currently holds.
#[derive(Clone, Copy)]
enum Slot {
    /// Never allocated, or freed.
    Dead,
    /// Holds the null pointer a zero sized request returned. Freeing it is a
    /// no-op.
    Null,
    Block(Live),
}

impl Slot {
    fn block(self) -> Option<Live> {
        match self {
            Slot::Block(live) => Some(live),
            Slot::Dead | Slot::Null => None,
        }
    }
}

struct Replayer<'a, S: PageSupplier> {
    heap: &'a mut Heap<S>,
    live: Vec<Slot>,
    payload: usize,
    peak_payload: usize,
}

impl<S: PageSupplier> Replayer<'_, S> {
    fn alloc(&mut self, op: usize, id: usize, size: usize) -> Result<(), TraceError> {
        // A block still live under this id is simply leaked, like the C driver does.
        self.forget(id);

        if size == 0 {
            self.live[id] = Slot::Null;
            return Ok(());
        }

        let ptr = self
            .heap
            .allocate(size)
            .ok_or(TraceError::AllocationFailed { op, size })?;

        self.track(op, id, Live { ptr, size }, 0)
    }

    fn resize(&mut self, op: usize, id: usize, size: usize) -> Result<(), TraceError> {
        let old = self.live[id].block();

        if let Some(old) = old {
            self.verify(op, id, &old)?;
        }

        let new = self.heap.resize(old.map(|live| live.ptr), size);
        self.forget(id);

        if size == 0 {
            self.live[id] = Slot::Null;
            return Ok(());
        }

        let ptr = new.ok_or(TraceError::AllocationFailed { op, size })?;
        let kept = old.map_or(0, |old| old.size.min(size));

        self.track(op, id, Live { ptr, size }, kept)
    }

    fn free(&mut self, op: usize, id: usize) -> Result<(), TraceError> {
        let live = match self.live[id] {
            Slot::Dead => return Err(TraceError::UnknownId { op, id }),
            Slot::Null => None,
            Slot::Block(live) => Some(live),
        };

        if let Some(live) = live {
            self.verify(op, id, &live)?;
        }

        self.forget(id);
        self.heap.free(live.map(|live| live.ptr));

        Ok(())
    }

    fn forget(&mut self, id: usize) {
        if let Slot::Block(live) = mem::replace(&mut self.live[id], Slot::Dead) {
            self.payload -= live.size;
        }
    }

    /// Registers a new block for `id`. The first `kept` bytes must already
    /// hold the stamp of `id`.
    fn track(&mut self, op: usize, id: usize, live: Live, kept: usize) -> Result<(), TraceError> {
        if live.ptr.offset() % ALIGNMENT != 0 {
            return Err(TraceError::Misaligned {
                op,
                offset: live.ptr.offset(),
            });
        }

        let range = live.range();
        let overlapping = self.live.iter().enumerate().find_map(|(other, block)| {
            block
                .block()
                .filter(|block| block.range().start < range.end && range.start < block.range().end)
                .map(|_| other)
        });

        if let Some(other) = overlapping {
            return Err(TraceError::Overlap { op, id, other });
        }

        let payload = &mut self.heap.payload_mut(live.ptr)[..live.size];

        if let Some(index) = (0..kept).find(|index| payload[*index] != stamp(id, *index)) {
            return Err(TraceError::Corrupted { op, id, index });
        }

        for (index, byte) in payload.iter_mut().enumerate() {
            *byte = stamp(id, index);
        }

        self.live[id] = Slot::Block(live);
        self.payload += live.size;
        self.peak_payload = self.peak_payload.max(self.payload);

        Ok(())
    }

    fn verify(&self, op: usize, id: usize, live: &Live) -> Result<(), TraceError> {
        let payload = &self.heap.payload(live.ptr)[..live.size];

        match payload
            .iter()
            .enumerate()
            .find(|(index, byte)| **byte != stamp(id, *index))
        {
            Some((index, _)) => Err(TraceError::Corrupted { op, id, index }),
            None => Ok(()),
        }
    }
}

impl Trace {
    /// Runs every request of the trace on `heap`.
    pub fn replay<S: PageSupplier>(&self, heap: &mut Heap<S>) -> Result<ReplayStats, TraceError> {
        self.run(heap, false)
    }

    /// Like [`Trace::replay`], but runs the consistency checker after every
    /// request. Much slower.
    pub fn replay_checked<S: PageSupplier>(
        &self,
        heap: &mut Heap<S>,
    ) -> Result<ReplayStats, TraceError> {
        self.run(heap, true)
    }

    fn run<S: PageSupplier>(&self, heap: &mut Heap<S>, checked: bool) -> Result<ReplayStats, TraceError> {
        let mut replayer = Replayer {
            heap,
            live: vec![Slot::Dead; self.ids],
            payload: 0,
            peak_payload: 0,
        };

        for (op, request) in self.ops.iter().enumerate() {
            match *request {
                Op::Alloc { id, size } => replayer.alloc(op, id, size)?,
                Op::Resize { id, size } => replayer.resize(op, id, size)?,
                Op::Free { id } => replayer.free(op, id)?,
            }

            if checked {
                replayer
                    .heap
                    .check()
                    .map_err(|source| TraceError::Heap { op, source })?;
            }
        }

        let heap_size = replayer.heap.heap_size();
        let stats = ReplayStats {
            ops: self.ops.len(),
            peak_payload: replayer.peak_payload,
            heap_size,
            utilization: replayer.peak_payload as f64 / heap_size as f64,
        };

        debug!(
            "replayed {} ops: peak payload {} bytes, heap {} bytes ({:.1}% utilization)",
            stats.ops,
            stats.peak_payload,
            stats.heap_size,
            stats.utilization * 100.0
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{arena::VecSupplier, config::Config};

    const SHORT1: &str = include_str!("../demos/traces/short1-bal.rep");
    const REALLOC: &str = include_str!("../demos/traces/realloc-short.rep");

    fn heap(config: Config) -> Heap<VecSupplier> {
        Heap::in_memory(config).unwrap()
    }

    #[test]
    fn parse_header_and_ops() {
        let trace: Trace = "100\n2\n4\n1\na 0 16\nr 0 32\n\na 1 8\nf 0\n".parse().unwrap();

        assert_eq!(trace.suggested_heap, 100);
        assert_eq!(trace.ids, 2);
        assert_eq!(trace.weight, 1);
        assert_eq!(
            trace.ops,
            vec![
                Op::Alloc { id: 0, size: 16 },
                Op::Resize { id: 0, size: 32 },
                Op::Alloc { id: 1, size: 8 },
                Op::Free { id: 0 },
            ]
        );
    }

    #[test]
    fn parse_errors_point_at_the_line() {
        let cases = [
            ("1\n1\n1\n", 0),
            ("1\n1\n1\nx\n", 4),
            ("1\n1\n1\n1\nq 0 1\n", 5),
            ("1\n1\n1\n1\na 0\n", 5),
            ("1\n1\n1\n1\na 3 8\n", 5),
            ("1\n1\n1\n1\nf zero\n", 5),
            ("1\n1\n2\n1\nf 0\n", 4),
            ("1\n100000000000000\n1\n1\na 0 8\n", 2),
        ];

        for (input, expected) in cases {
            match input.parse::<Trace>() {
                Err(TraceError::Parse { line, .. }) => assert_eq!(line, expected, "{input:?}"),
                other => panic!("{input:?} should not parse: {other:?}"),
            }
        }
    }

    #[test]
    fn replay_bundled_traces() {
        for input in [SHORT1, REALLOC] {
            let trace: Trace = input.parse().unwrap();

            for config in [Config::default(), Config::compact()] {
                let mut heap = heap(config);
                let stats = trace.replay_checked(&mut heap).unwrap();

                assert_eq!(stats.ops, trace.ops.len());
                assert!(stats.peak_payload > 0);
                assert!(stats.utilization > 0.0 && stats.utilization <= 1.0);
            }
        }
    }

    #[test]
    fn replay_reports_exhaustion() {
        let trace: Trace = "0\n1\n1\n1\na 0 100000\n".parse().unwrap();
        let mut heap = heap(Config::default().with_max_heap(1 << 16));

        assert!(matches!(
            trace.replay(&mut heap),
            Err(TraceError::AllocationFailed { op: 0, size: 100000 })
        ));
    }

    #[test]
    fn replay_rejects_double_free() {
        let trace: Trace = "0\n1\n3\n1\na 0 8\nf 0\nf 0\n".parse().unwrap();
        let mut heap = heap(Config::default());

        assert!(matches!(
            trace.replay(&mut heap),
            Err(TraceError::UnknownId { op: 2, id: 0 })
        ));
    }

    #[test]
    fn zero_sized_requests() {
        let trace: Trace = "0\n2\n5\n1\na 0 0\na 1 24\nr 1 0\nr 0 16\nf 0\n".parse().unwrap();
        let mut heap = heap(Config::default());

        let stats = trace.replay_checked(&mut heap).unwrap();
        assert_eq!(stats.peak_payload, 24);
        assert_eq!(heap.stats().allocated_blocks, 0);
    }

    #[test]
    fn free_after_zero_sized_request_is_a_noop() {
        let trace: Trace = "0\n2\n6\n1\na 0 0\nf 0\na 1 16\nr 1 0\nf 1\nf 0\n"
            .parse()
            .unwrap();
        let mut heap = heap(Config::default());

        // Both nulls are freed once, then id 0 is freed a second time.
        assert!(matches!(
            trace.replay_checked(&mut heap),
            Err(TraceError::UnknownId { op: 5, id: 0 })
        ));
        assert_eq!(heap.stats().allocated_blocks, 0);
    }

    #[test]
    fn random_trace() {
        let mut rng = StdRng::seed_from_u64(42);
        let ids = 200;
        let mut live = vec![false; ids];
        let mut ops = Vec::new();

        for _ in 0..3000 {
            let id = rng.random_range(0..ids);
            let size = rng.random_range(1..3000);

            let op = match (live[id], rng.random_range(0..3)) {
                (false, _) => Op::Alloc { id, size },
                (true, 0) => Op::Resize { id, size },
                (true, _) => Op::Free { id },
            };

            live[id] = !matches!(op, Op::Free { .. });
            ops.push(op);
        }

        let trace = Trace {
            suggested_heap: 0,
            ids,
            weight: 1,
            ops,
        };

        for config in [Config::default(), Config::compact()] {
            let mut heap = heap(config);
            trace.replay(&mut heap).unwrap();
            heap.check().unwrap();
        }
    }
}
