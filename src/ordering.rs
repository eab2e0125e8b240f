//! Partition ordering file: one partition index per line.

use std::fs;
use std::path::Path;

use log::info;

use crate::error::{PlannerError, Result};

/// Permutation of partition indices; entry `i` is the original index of the
/// partition placed at position `i`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VariableOrdering {
    order: Vec<usize>,
}

impl VariableOrdering {
    pub fn new(order: Vec<usize>) -> Result<Self> {
        let mut seen = vec![false; order.len()];
        for &i in &order {
            match seen.get_mut(i) {
                Some(s) if !*s => *s = true,
                Some(_) => return Err(PlannerError::Parse(format!("partition {} occurs twice in ordering", i))),
                None => {
                    return Err(PlannerError::Parse(format!(
                        "partition {} out of range for {} partitions",
                        i,
                        order.len()
                    )))
                }
            }
        }
        Ok(Self { order })
    }

    pub fn identity(n: usize) -> Self {
        Self { order: (0..n).collect() }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(i, &p)| i == p)
    }

    pub fn to_text(&self) -> String {
        self.order.iter().map(|p| format!("{}\n", p)).collect()
    }

    pub fn from_text(content: &str) -> Result<Self> {
        let order = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<usize>()
                    .map_err(|_| PlannerError::Parse(format!("Invalid partition index: {}", line)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(order)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_text(&content).map_err(|e| match e {
            PlannerError::Parse(msg) => PlannerError::Parse(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Load `path`, or write the identity order for `n` partitions there if it does not exist.
    pub fn load_or_init<P: AsRef<Path>>(path: P, n: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let ordering = Self::load(path)?;
            info!("Loaded partition ordering from {}", path.display());
            Ok(ordering)
        } else {
            let ordering = Self::identity(n);
            ordering.save(path)?;
            info!("Wrote identity partition ordering to {}", path.display());
            Ok(ordering)
        }
    }
}
