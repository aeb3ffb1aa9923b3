//! Ping-pong node state
//!
//! Positions live in two equal-sized buffers. Which one is read and which one
//! is written is a pure function of step parity: step `s` reads
//! `Slot::current(s)` and writes `Slot::next(s)`, and the written buffer becomes
//! current once the step counter advances.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// One node position in clip space
pub type Vec2 = [f32; 2];

/// Identity of one of the two position buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Ping,
    Pong,
}

impl Slot {
    /// Buffer that is safe to read at `step`
    pub fn current(step: u64) -> Self {
        if step % 2 == 0 { Slot::Ping } else { Slot::Pong }
    }

    /// Buffer written by the step in flight at `step`
    pub fn next(step: u64) -> Self {
        Self::current(step).other()
    }

    /// The opposite buffer
    pub fn other(self) -> Self {
        match self {
            Slot::Ping => Slot::Pong,
            Slot::Pong => Slot::Ping,
        }
    }
}

/// Two-slot arena indexed by [`Slot`]
#[derive(Debug, Clone, PartialEq)]
pub struct PingPong<T> {
    ping: T,
    pong: T,
}

impl<T> PingPong<T> {
    /// Create from the two slot contents
    pub fn new(ping: T, pong: T) -> Self {
        Self { ping, pong }
    }

    /// Borrow one slot
    pub fn get(&self, slot: Slot) -> &T {
        match slot {
            Slot::Ping => &self.ping,
            Slot::Pong => &self.pong,
        }
    }

    /// Borrow `read` shared and the other slot exclusively.
    pub fn split(&mut self, read: Slot) -> (&T, &mut T) {
        match read {
            Slot::Ping => (&self.ping, &mut self.pong),
            Slot::Pong => (&self.pong, &mut self.ping),
        }
    }
}

/// CPU-side position buffers
pub type PositionStore = PingPong<Vec<Vec2>>;

impl PositionStore {
    /// Put `initial` in the ping slot; pong starts zeroed and is fully
    /// overwritten by the first step before anything reads it.
    pub fn from_initial(initial: Vec<Vec2>) -> Self {
        let pong = vec![[0.0, 0.0]; initial.len()];
        Self::new(initial, pong)
    }

    /// Number of nodes held in each slot
    pub fn node_count(&self) -> usize {
        self.ping.len()
    }
}

/// Uniform random positions in `[-0.5, 0.5)` on each axis, x then y per node
pub fn random_positions<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Vec2> {
    (0..n)
        .map(|_| {
            let x = rng.r#gen::<f32>() - 0.5;
            let y = rng.r#gen::<f32>() - 0.5;
            [x, y]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_buffer_roles_alternate() {
        for step in 0..64u64 {
            assert_ne!(Slot::current(step), Slot::next(step));
            assert_eq!(Slot::next(step), Slot::current(step + 1));
        }
        assert_eq!(Slot::current(0), Slot::Ping);
        assert_eq!(Slot::current(1), Slot::Pong);
    }

    #[test]
    fn test_other_slot() {
        assert_eq!(Slot::Ping.other(), Slot::Pong);
        assert_eq!(Slot::Pong.other(), Slot::Ping);
    }

    #[test]
    fn test_split_borrows_opposite_slots() {
        let mut store = PingPong::new(vec![1], vec![2]);
        {
            let (read, write) = store.split(Slot::current(0));
            assert_eq!(read, &vec![1]);
            write[0] = read[0] + 10;
        }
        assert_eq!(store.get(Slot::Pong), &vec![11]);

        let (read, write) = store.split(Slot::current(1));
        assert_eq!(read, &vec![11]);
        assert_eq!(write, &mut vec![1]);
    }

    #[test]
    fn test_from_initial_zeroes_pong() {
        let store = PositionStore::from_initial(vec![[0.25, -0.25]; 3]);
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.get(Slot::Ping), &vec![[0.25, -0.25]; 3]);
        assert_eq!(store.get(Slot::Pong), &vec![[0.0, 0.0]; 3]);
    }

    #[test]
    fn test_random_positions_in_unit_square() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let positions = random_positions(2000, &mut rng);
        assert_eq!(positions.len(), 2000);
        for p in &positions {
            assert!((-0.5..0.5).contains(&p[0]));
            assert!((-0.5..0.5).contains(&p[1]));
        }
        // Both halves of each axis are populated
        assert!(positions.iter().any(|p| p[0] < 0.0));
        assert!(positions.iter().any(|p| p[0] > 0.0));
        assert!(positions.iter().any(|p| p[1] < 0.0));
        assert!(positions.iter().any(|p| p[1] > 0.0));
    }

    #[test]
    fn test_random_positions_reproducible() {
        let a = random_positions(50, &mut ChaCha8Rng::seed_from_u64(3));
        let b = random_positions(50, &mut ChaCha8Rng::seed_from_u64(3));
        let a_bits: Vec<u32> = a.iter().flatten().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.iter().flatten().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }
}
