//! Cascade interactive error reconciliation.
//!
//! Both parties run [`reconcile`] with opposite [`Role`]s over a [`PeerLink`].
//! The reference party's key is ground truth and never changes; the corrector
//! flips its own bits until every block of every iteration so far has the same
//! parity on both sides.
//!
//! Iteration 0 uses contiguous blocks of `ceil(0.73 / e)` bits. Each later
//! iteration doubles the block size over a fresh random permutation chosen by
//! the reference. When the corrector fixes a bit, the blocks holding that bit
//! in every earlier iteration change parity; any that turn dirty are queued and
//! bisected too, which is the cascading step.

mod partition;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

pub use partition::{Partition, parity};

use crate::protocol::{Half, Message, PeerLink};

/// Number of Cascade iterations.
pub const ITERATIONS: usize = 4;

/// Error rate assumed when the sample showed no errors at all.
pub const ESTIMATE_FLOOR: f64 = 0.01;

/// Which side of the reconciliation this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the ground-truth key; answers parity queries.
    Reference,
    /// Flips its own bits to match the reference.
    Corrector,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub initial_block_size: usize,
    /// Dirty blocks bisected across all iterations.
    pub bisections: usize,
    /// Bisections of an earlier iteration's block reopened by a later flip.
    pub cascaded: usize,
    /// Key indices flipped by the corrector (always empty for the reference).
    pub flipped: Vec<usize>,
}

/// Iteration-0 block size for a measured error rate.
pub fn initial_block_size(error_rate: f64) -> usize {
    let rate = if error_rate <= 0.0 {
        ESTIMATE_FLOOR
    } else {
        error_rate
    };
    ((0.73 / rate).ceil() as usize).max(1)
}

/// Run all Cascade iterations for `role` over `key`.
///
/// `rng` only drives the reference's permutations; the corrector never draws.
pub async fn reconcile<L, R>(
    role: Role,
    key: &mut [bool],
    error_rate: f64,
    link: &mut L,
    rng: &mut R,
) -> Result<CascadeReport, L::Error>
where
    L: PeerLink + Send,
    R: Rng + Send,
{
    let block_size = initial_block_size(error_rate);
    info!(?role, key_len = key.len(), block_size, "starting cascade");

    let mut cascade = Cascade {
        role,
        key,
        link,
        partitions: Vec::with_capacity(ITERATIONS),
        own: Vec::with_capacity(ITERATIONS),
        peer: Vec::with_capacity(ITERATIONS),
        report: CascadeReport {
            initial_block_size: block_size,
            ..CascadeReport::default()
        },
    };

    for iteration in 0..ITERATIONS {
        cascade.link.checkpoint()?;
        let size = block_size.saturating_mul(1 << iteration);
        cascade.open_iteration(iteration, size, rng).await?;
        match role {
            Role::Reference => cascade.serve_iteration(iteration).await?,
            Role::Corrector => cascade.correct_iteration(iteration).await?,
        }
        debug!(
            ?role,
            iteration,
            bisections = cascade.report.bisections,
            flipped = cascade.report.flipped.len(),
            "cascade iteration done"
        );
    }

    info!(
        ?role,
        bisections = cascade.report.bisections,
        cascaded = cascade.report.cascaded,
        flipped = cascade.report.flipped.len(),
        "cascade finished"
    );
    Ok(cascade.report)
}

struct Cascade<'a, L> {
    role: Role,
    key: &'a mut [bool],
    link: &'a mut L,
    partitions: Vec<Partition>,
    /// Corrector only: own and reference parities, per iteration per block.
    own: Vec<Vec<bool>>,
    peer: Vec<Vec<bool>>,
    report: CascadeReport,
}

impl<L: PeerLink + Send> Cascade<'_, L> {
    /// Agree on the partition for `iteration` and exchange block parities.
    async fn open_iteration<R: Rng + Send>(
        &mut self,
        iteration: usize,
        block_size: usize,
        rng: &mut R,
    ) -> Result<(), L::Error> {
        let len = self.key.len();
        let partition = if iteration == 0 {
            Partition::contiguous(len, block_size)
        } else {
            match self.role {
                Role::Reference => {
                    let mut order: Vec<usize> = (0..len).collect();
                    order.shuffle(rng);
                    self.link
                        .send(Message::Permutation {
                            iteration,
                            order: order.clone(),
                        })
                        .await?;
                    Partition::permuted(order, len, block_size)?
                }
                Role::Corrector => match self.link.recv().await? {
                    Message::Permutation {
                        iteration: got,
                        order,
                    } if got == iteration => Partition::permuted(order, len, block_size)?,
                    other => return Err(other.unexpected("permutation").into()),
                },
            }
        };

        let parities = partition.parities(self.key);
        match self.role {
            Role::Reference => {
                self.link
                    .send(Message::BlockParities {
                        iteration,
                        parities,
                    })
                    .await?;
            }
            Role::Corrector => {
                let reference = match self.link.recv().await? {
                    Message::BlockParities {
                        iteration: got,
                        parities,
                    } if got == iteration && parities.len() == partition.block_count() => parities,
                    other => return Err(other.unexpected("block_parities").into()),
                };
                self.own.push(parities);
                self.peer.push(reference);
            }
        }
        self.partitions.push(partition);
        Ok(())
    }

    /// Reference side: answer bisection requests until the corrector is done.
    async fn serve_iteration(&mut self, iteration: usize) -> Result<(), L::Error> {
        loop {
            self.link.checkpoint()?;
            match self.link.recv().await? {
                Message::Bisect {
                    iteration: target,
                    block,
                } if target <= iteration && block < self.partitions[target].block_count() => {
                    self.report.bisections += 1;
                    if target < iteration {
                        self.report.cascaded += 1;
                    }
                    self.bisect(target, block).await?;
                }
                Message::RoundDone => return Ok(()),
                other => return Err(other.unexpected("bisect or round_done").into()),
            }
        }
    }

    /// Corrector side: fix every dirty block of `iteration`, cascading each
    /// correction back into earlier iterations.
    async fn correct_iteration(&mut self, iteration: usize) -> Result<(), L::Error> {
        let mut pending = Vec::new();
        for block in 0..self.partitions[iteration].block_count() {
            pending.push((iteration, block));
            while let Some((target, b)) = pending.pop() {
                if self.own[target][b] == self.peer[target][b] {
                    continue;
                }
                self.link.checkpoint()?;
                self.link
                    .send(Message::Bisect {
                        iteration: target,
                        block: b,
                    })
                    .await?;
                self.report.bisections += 1;
                if target < iteration {
                    self.report.cascaded += 1;
                }
                let index = self.bisect(target, b).await?;
                debug!(iteration = target, block = b, index, "flipped bit");
                self.report.flipped.push(index);
                propagate_flip(
                    &self.partitions,
                    &mut self.own,
                    &self.peer,
                    index,
                    &mut pending,
                );
            }
        }
        self.link.send(Message::RoundDone).await?;
        Ok(())
    }

    /// Binary search for one erroneous bit inside a dirty block.
    ///
    /// Both roles walk the same range. The reference reports the parity of
    /// the first half, the corrector answers which half to keep, and once the
    /// range is a single bit the corrector flips it. Returns that key index
    /// (for the reference, the index is not known and the block's first index
    /// is returned).
    async fn bisect(&mut self, iteration: usize, block: usize) -> Result<usize, L::Error> {
        let range = self.partitions[iteration].block(block).to_vec();
        let (mut lo, mut hi) = (0, range.len());

        while hi - lo > 1 {
            self.link.checkpoint()?;
            let mid = lo + (hi - lo).div_ceil(2);
            match self.role {
                Role::Reference => {
                    let first = parity(self.key, &range[lo..mid]);
                    self.link.send(Message::HalfParity(first)).await?;
                    match self.link.recv().await? {
                        Message::Descend(Half::First) if mid - lo > 1 => hi = mid,
                        Message::Descend(Half::Second) if hi - mid > 1 => lo = mid,
                        Message::Located if mid - lo == 1 || hi - mid == 1 => return Ok(range[lo]),
                        other => return Err(other.unexpected("descend or located").into()),
                    }
                }
                Role::Corrector => {
                    let reference_first = match self.link.recv().await? {
                        Message::HalfParity(p) => p,
                        other => return Err(other.unexpected("half_parity").into()),
                    };
                    let half = if parity(self.key, &range[lo..mid]) == reference_first {
                        lo = mid;
                        Half::Second
                    } else {
                        hi = mid;
                        Half::First
                    };
                    let reply = if hi - lo == 1 {
                        Message::Located
                    } else {
                        Message::Descend(half)
                    };
                    self.link.send(reply).await?;
                }
            }
        }

        let index = range[lo];
        if self.role == Role::Corrector {
            self.key[index] = !self.key[index];
        }
        Ok(index)
    }
}

/// Record that key bit `index` flipped: toggle the parity of the block holding
/// it in every iteration so far and queue the ones that no longer match.
fn propagate_flip(
    partitions: &[Partition],
    own: &mut [Vec<bool>],
    peer: &[Vec<bool>],
    index: usize,
    pending: &mut Vec<(usize, usize)>,
) {
    for (iteration, partition) in partitions.iter().enumerate() {
        let block = partition.block_of(index);
        own[iteration][block] = !own[iteration][block];
        if own[iteration][block] != peer[iteration][block] {
            pending.push((iteration, block));
        }
    }
}
