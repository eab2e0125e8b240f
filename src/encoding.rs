//! Binary encoding of partitions into interleaved current/next BDD variables.
//!
//! Bit `i` of the state vector is current variable `2i + 1` and next variable
//! `2i + 2`. Each partition owns a contiguous run of bits; member codes are
//! written most significant bit first.

use std::collections::HashMap;
use std::rc::Rc;

use num_bigint::BigUint;

use crate::bdd::{Bdd, VarSet};
use crate::error::{PlannerError, Result};
use crate::model::Partition;
use crate::reference::Ref;
use crate::utils::ceil_log2;

/// Which copy of the state variables a literal ranges over.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Frame {
    Current,
    Next,
}

/// Bits assigned to one partition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PartitionLayout {
    pub first_bit: usize,
    pub bits: u32,
    pub size: usize,
}

impl PartitionLayout {
    pub fn bit_range(&self) -> std::ops::Range<usize> {
        self.first_bit..self.first_bit + self.bits as usize
    }
}

pub fn current_var(bit: usize) -> u32 {
    2 * bit as u32 + 1
}

pub fn next_var(bit: usize) -> u32 {
    2 * bit as u32 + 2
}

/// Compute the bit layout; a pure function of partition order and sizes.
pub fn layout(partitions: &[Partition]) -> Vec<PartitionLayout> {
    let mut first_bit = 0;
    partitions
        .iter()
        .map(|p| {
            let bits = ceil_log2(p.len()).max(1);
            let l = PartitionLayout {
                first_bit,
                bits,
                size: p.len(),
            };
            first_bit += bits as usize;
            l
        })
        .collect()
}

pub struct StateEncoder {
    bdd: Rc<Bdd>,
    layouts: Vec<PartitionLayout>,
    num_bits: usize,
    current_vars: VarSet,
    next_vars: VarSet,
    to_next: HashMap<u32, u32>,
    to_current: HashMap<u32, u32>,
}

impl StateEncoder {
    pub fn new(bdd: Rc<Bdd>, partitions: &[Partition]) -> Self {
        let layouts = layout(partitions);
        let num_bits = layouts.iter().map(|l| l.bits as usize).sum();
        Self {
            bdd,
            layouts,
            num_bits,
            current_vars: VarSet::new((0..num_bits).map(current_var)),
            next_vars: VarSet::new((0..num_bits).map(next_var)),
            to_next: (0..num_bits).map(|b| (current_var(b), next_var(b))).collect(),
            to_current: (0..num_bits).map(|b| (next_var(b), current_var(b))).collect(),
        }
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    pub fn bdd_rc(&self) -> Rc<Bdd> {
        Rc::clone(&self.bdd)
    }

    pub fn layouts(&self) -> &[PartitionLayout] {
        &self.layouts
    }

    pub fn num_partitions(&self) -> usize {
        self.layouts.len()
    }

    /// Number of state bits (half the number of BDD variables).
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn current_vars(&self) -> &VarSet {
        &self.current_vars
    }

    pub fn next_vars(&self) -> &VarSet {
        &self.next_vars
    }

    /// Current-state variables of one partition.
    pub fn partition_vars(&self, partition: usize) -> impl Iterator<Item = u32> {
        self.layouts[partition].bit_range().map(current_var)
    }

    /// Conjunction of bit literals spelling `member`'s code in `partition`.
    pub fn literal(&self, partition: usize, member: usize, frame: Frame) -> Result<Ref> {
        let l = self.layouts.get(partition).ok_or_else(|| {
            PlannerError::model(format!("partition {}", partition), "no such partition")
        })?;
        if member >= 1usize << l.bits {
            return Err(PlannerError::model(
                format!("partition {}", partition),
                format!("member {} does not fit into {} bits", member, l.bits),
            ));
        }
        let literals = l.bit_range().enumerate().map(|(k, bit)| {
            let var = match frame {
                Frame::Current => current_var(bit),
                Frame::Next => next_var(bit),
            } as i32;
            let set = (member >> (l.bits as usize - 1 - k)) & 1 == 1;
            if set {
                var
            } else {
                -var
            }
        });
        Ok(self.bdd.cube(literals))
    }

    /// Per-bit biconditional `next ⇔ current` for one partition.
    pub fn frame(&self, partition: usize) -> Ref {
        let bdd = &self.bdd;
        bdd.apply_and_many(
            self.layouts[partition]
                .bit_range()
                .map(|bit| bdd.apply_eq(bdd.mk_var(current_var(bit)), bdd.mk_var(next_var(bit)))),
        )
    }

    /// States in which `partition` holds a valid member code.
    pub fn valid_codes(&self, partition: usize) -> Result<Ref> {
        let l = self.layouts[partition];
        if l.size == 1 << l.bits {
            return Ok(self.bdd.one);
        }
        let members = (0..l.size)
            .map(|m| self.literal(partition, m, Frame::Current))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.bdd.apply_or_many(members))
    }

    /// States in which every partition holds a valid member code.
    pub fn valid_states(&self) -> Result<Ref> {
        let conjuncts = (0..self.layouts.len())
            .map(|p| self.valid_codes(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.bdd.apply_and_many(conjuncts))
    }

    /// Member index of `partition` in a single state, if the code is valid.
    pub fn decode(&self, state: Ref, partition: usize) -> Option<usize> {
        (0..self.layouts[partition].size).find(|&m| {
            self.literal(partition, m, Frame::Current)
                .map(|lit| !self.bdd.is_zero(self.bdd.apply_and(state, lit)))
                .unwrap_or(false)
        })
    }

    pub fn to_next(&self, f: Ref) -> Ref {
        self.bdd.rename(f, &self.to_next)
    }

    pub fn to_current(&self, f: Ref) -> Ref {
        self.bdd.rename(f, &self.to_current)
    }

    /// Number of states in a set over current variables.
    pub fn count_states(&self, states: Ref) -> BigUint {
        self.bdd.sat_count(states, 2 * self.num_bits) >> self.num_bits
    }
}
