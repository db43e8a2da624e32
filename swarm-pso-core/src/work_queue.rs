//! Per-iteration work queue
//!
//! Tracks which particles of the current iteration are pending, assigned or
//! done. Assignments carry a deadline; once it passes, the item may be handed
//! to another worker. Expired items are reissued before fresh ones.
//!
//! Time is supplied by the caller as milliseconds on any monotonic clock.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::swarm::{ParticleStatus, Swarm};
use crate::traits::{ParticleId, WorkerId};
use crate::{Error, Result};

/// One outstanding request to evaluate a particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub particle_id: ParticleId,
    /// Iteration the item belongs to
    pub iteration: u64,
    /// Particle position at dispatch time
    pub params: Vec<f64>,
    pub assigned_worker: Option<WorkerId>,
    pub issued_at_ms: u64,
    pub deadline_ms: u64,
}

impl WorkItem {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub item: WorkItem,
    /// Previous holder when this is a deadline reissue
    pub reissued_from: Option<WorkerId>,
}

/// Result of completing an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// First report for the particle this iteration
    Accepted,
    /// Particle already done; the report is ignored
    Duplicate,
}

#[derive(Debug, Clone)]
struct Outstanding {
    item: WorkItem,
    /// Workers whose earlier assignment expired; their reports still count
    previous: Vec<WorkerId>,
}

impl Outstanding {
    fn held_by(&self, worker: &WorkerId) -> bool {
        self.item.assigned_worker.as_ref() == Some(worker) || self.previous.contains(worker)
    }
}

/// Pending, assigned and done sets for one iteration
#[derive(Debug, Clone)]
pub struct WorkQueue {
    iteration: u64,
    particle_count: usize,
    lease_ms: u64,
    pending: VecDeque<ParticleId>,
    outstanding: BTreeMap<ParticleId, Outstanding>,
    completed: BTreeSet<ParticleId>,
}

impl WorkQueue {
    /// Empty queue whose assignments expire `lease_ms` after issue
    pub fn new(lease_ms: u64) -> Self {
        Self {
            iteration: 0,
            particle_count: 0,
            lease_ms,
            pending: VecDeque::new(),
            outstanding: BTreeMap::new(),
            completed: BTreeSet::new(),
        }
    }

    /// Reset for a new iteration with every particle pending
    pub fn populate(&mut self, iteration: u64, particle_count: usize) {
        self.iteration = iteration;
        self.particle_count = particle_count;
        self.pending = (0..particle_count as u32).map(ParticleId).collect();
        self.outstanding.clear();
        self.completed.clear();
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn lease_ms(&self) -> u64 {
        self.lease_ms
    }

    /// Hand the next item to `worker`.
    ///
    /// The assignment with the oldest elapsed deadline is reissued first;
    /// otherwise the next pending particle is dispatched. Returns `None` when
    /// nothing is eligible right now.
    pub fn assign(
        &mut self,
        swarm: &Swarm,
        worker: &WorkerId,
        now_ms: u64,
    ) -> Result<Option<Assignment>> {
        let deadline_ms = now_ms.saturating_add(self.lease_ms);

        let expired = self
            .outstanding
            .iter()
            .filter(|(_, o)| o.item.is_expired(now_ms))
            .min_by_key(|(_, o)| o.item.deadline_ms)
            .map(|(id, _)| *id);

        if let Some(id) = expired {
            let entry = self
                .outstanding
                .get_mut(&id)
                .ok_or(Error::InvariantViolation("expired item vanished"))?;
            let previous = entry.item.assigned_worker.replace(worker.clone());
            if let Some(prev) = &previous {
                if !entry.previous.contains(prev) {
                    entry.previous.push(prev.clone());
                }
            }
            entry.item.issued_at_ms = now_ms;
            entry.item.deadline_ms = deadline_ms;
            return Ok(Some(Assignment {
                item: entry.item.clone(),
                reissued_from: previous,
            }));
        }

        let Some(id) = self.pending.pop_front() else {
            return Ok(None);
        };
        let item = WorkItem {
            particle_id: id,
            iteration: self.iteration,
            params: swarm.particle(id)?.position.clone(),
            assigned_worker: Some(worker.clone()),
            issued_at_ms: now_ms,
            deadline_ms,
        };
        self.outstanding.insert(
            id,
            Outstanding {
                item: item.clone(),
                previous: Vec::new(),
            },
        );
        Ok(Some(Assignment {
            item,
            reissued_from: None,
        }))
    }

    /// Mark `particle` done on behalf of `worker`.
    ///
    /// A second report for a done particle is a [`Completion::Duplicate`].
    pub fn complete(&mut self, particle: ParticleId, worker: &WorkerId) -> Result<Completion> {
        if particle.index() >= self.particle_count {
            return Err(Error::UnknownParticle(particle));
        }
        if self.completed.contains(&particle) {
            return Ok(Completion::Duplicate);
        }
        match self.outstanding.get(&particle) {
            None => Err(Error::NotAssigned(particle)),
            Some(entry) if !entry.held_by(worker) => Err(Error::WrongWorker(particle)),
            Some(_) => {
                self.outstanding.remove(&particle);
                self.completed.insert(particle);
                Ok(Completion::Accepted)
            }
        }
    }

    /// Status of a particle as seen by the queue
    pub fn status(&self, particle: ParticleId) -> Option<ParticleStatus> {
        if particle.index() >= self.particle_count {
            None
        } else if self.completed.contains(&particle) {
            Some(ParticleStatus::Done)
        } else if self.outstanding.contains_key(&particle) {
            Some(ParticleStatus::Assigned)
        } else {
            Some(ParticleStatus::Pending)
        }
    }

    /// Every particle of the iteration has been reported
    pub fn is_complete(&self) -> bool {
        self.particle_count > 0 && self.completed.len() == self.particle_count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Earliest deadline among outstanding items
    pub fn next_deadline(&self) -> Option<u64> {
        self.outstanding.values().map(|o| o.item.deadline_ms).min()
    }

    pub fn outstanding_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.outstanding.values().map(|o| &o.item)
    }

    /// Drop everything still pending or outstanding; returns how many
    /// assignments were abandoned.
    pub fn abandon(&mut self) -> usize {
        let abandoned = self.outstanding.len();
        self.outstanding.clear();
        self.pending.clear();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{Bounds, ParticleSwarmConfig};
    use crate::swarm::Particle;
    use alloc::vec;

    fn swarm(n: usize) -> Swarm {
        let config = ParticleSwarmConfig {
            num_particles: n,
            bounds: vec![Bounds::new(0.0, 10.0)],
            ..ParticleSwarmConfig::default()
        };
        let particles = (0..n)
            .map(|i| Particle::new(ParticleId(0), vec![i as f64], vec![0.0]))
            .collect();
        Swarm::from_particles(config, particles).unwrap()
    }

    fn queue(n: usize) -> WorkQueue {
        let mut q = WorkQueue::new(1_000);
        q.populate(0, n);
        q
    }

    #[test]
    fn dispatches_pending_in_order() {
        let s = swarm(2);
        let mut q = queue(2);
        let a = WorkerId::new("a");

        let first = q.assign(&s, &a, 0).unwrap().unwrap();
        assert_eq!(first.item.particle_id, ParticleId(0));
        assert_eq!(first.item.params, vec![0.0]);
        assert_eq!(first.item.deadline_ms, 1_000);
        assert_eq!(first.reissued_from, None);

        let second = q.assign(&s, &a, 10).unwrap().unwrap();
        assert_eq!(second.item.particle_id, ParticleId(1));
        assert!(q.assign(&s, &a, 20).unwrap().is_none());
        assert_eq!(q.outstanding_len(), 2);
        assert_eq!(q.next_deadline(), Some(1_000));
    }

    #[test]
    fn item_not_reissued_before_deadline() {
        let s = swarm(1);
        let mut q = queue(1);
        q.assign(&s, &WorkerId::new("a"), 0).unwrap();
        assert!(q.assign(&s, &WorkerId::new("b"), 999).unwrap().is_none());
    }

    #[test]
    fn expired_item_reissued_before_fresh_work() {
        let s = swarm(2);
        let mut q = queue(2);
        let a = WorkerId::new("a");
        let b = WorkerId::new("b");
        q.assign(&s, &a, 0).unwrap();

        let again = q.assign(&s, &b, 1_000).unwrap().unwrap();
        assert_eq!(again.item.particle_id, ParticleId(0));
        assert_eq!(again.reissued_from, Some(a.clone()));
        assert_eq!(again.item.assigned_worker, Some(b));
        assert_eq!(again.item.deadline_ms, 2_000);
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn previous_holder_may_still_report() {
        let s = swarm(1);
        let mut q = queue(1);
        let a = WorkerId::new("a");
        let b = WorkerId::new("b");
        q.assign(&s, &a, 0).unwrap();
        q.assign(&s, &b, 5_000).unwrap();

        assert_eq!(q.complete(ParticleId(0), &a), Ok(Completion::Accepted));
        assert_eq!(q.complete(ParticleId(0), &b), Ok(Completion::Duplicate));
        assert!(q.is_complete());
    }

    #[test]
    fn completion_errors() {
        let s = swarm(2);
        let mut q = queue(2);
        let a = WorkerId::new("a");
        assert_eq!(
            q.complete(ParticleId(7), &a),
            Err(Error::UnknownParticle(ParticleId(7)))
        );
        assert_eq!(
            q.complete(ParticleId(1), &a),
            Err(Error::NotAssigned(ParticleId(1)))
        );
        q.assign(&s, &a, 0).unwrap();
        assert_eq!(
            q.complete(ParticleId(0), &WorkerId::new("stranger")),
            Err(Error::WrongWorker(ParticleId(0)))
        );
    }

    #[test]
    fn status_tracks_lifecycle() {
        let s = swarm(1);
        let mut q = queue(1);
        let a = WorkerId::new("a");
        assert_eq!(q.status(ParticleId(0)), Some(ParticleStatus::Pending));
        q.assign(&s, &a, 0).unwrap();
        assert_eq!(q.status(ParticleId(0)), Some(ParticleStatus::Assigned));
        q.complete(ParticleId(0), &a).unwrap();
        assert_eq!(q.status(ParticleId(0)), Some(ParticleStatus::Done));
        assert_eq!(q.status(ParticleId(1)), None);
    }

    #[test]
    fn abandon_reports_outstanding() {
        let s = swarm(3);
        let mut q = queue(3);
        q.assign(&s, &WorkerId::new("a"), 0).unwrap();
        assert_eq!(q.abandon(), 1);
        assert_eq!(q.pending_len(), 0);
        assert!(!q.is_complete());
    }
}
