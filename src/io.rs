//! Persistence of BDDs.
//!
//! # File Format (.bdd)
//!
//! ```text
//! bdd <node_count> <root>
//! N <id> <var> <low> <high>      # decision node
//! ```
//!
//! Nodes appear bottom-up (children before parents). Node ids start at 2, id 1
//! is the terminal. References are signed ids: `-x` is the complement of `x`,
//! so `1` is true and `-1` is false. Lines starting with `c` are comments.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::bdd::Bdd;
use crate::error::{PlannerError, Result};
use crate::reference::Ref;

impl Bdd {
    /// Saves `f` to a file.
    pub fn save<P: AsRef<Path>>(&self, f: Ref, path: P) -> Result<()> {
        let content = self.to_bdd_string(f);
        fs::write(path, content)?;
        Ok(())
    }

    /// Converts `f` to the textual format.
    pub fn to_bdd_string(&self, f: Ref) -> String {
        let mut ids: HashMap<u32, i64> = HashMap::new();
        let mut body = String::new();
        self.write_node(f, &mut ids, &mut body);

        let mut output = String::new();
        output.push_str("c ids of bdd nodes start at 2, id 1 is the terminal\n");
        output.push_str("c nodes appear bottom-up, children before parents\n");
        output.push_str("c\n");
        output.push_str("c file syntax:\n");
        output.push_str("c bdd number-of-nodes root\n");
        output.push_str("c N id variable low high\n");
        output.push_str("c\n");
        output.push_str(&format!("bdd {} {}\n", ids.len(), self.file_ref(f, &ids)));
        output.push_str(&body);
        output
    }

    fn file_ref(&self, r: Ref, ids: &HashMap<u32, i64>) -> i64 {
        let id = if self.is_terminal(r) { 1 } else { ids[&r.id()] };
        if r.is_negated() {
            -id
        } else {
            id
        }
    }

    fn write_node(&self, r: Ref, ids: &mut HashMap<u32, i64>, output: &mut String) {
        if self.is_terminal(r) || ids.contains_key(&r.id()) {
            return;
        }
        let i = r.index();
        let (low, high) = (self.low(i), self.high(i));
        self.write_node(low, ids, output);
        self.write_node(high, ids, output);

        let id = ids.len() as i64 + 2;
        ids.insert(r.id(), id);
        output.push_str(&format!(
            "N {} {} {} {}\n",
            id,
            self.variable(i),
            self.file_ref(low, ids),
            self.file_ref(high, ids)
        ));
    }

    /// Reads a BDD from a file into this manager.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Ref> {
        let path = path.as_ref();
        debug!("Loading BDD from {}", path.display());
        let content = fs::read_to_string(path)?;
        self.from_bdd_string(&content)
            .map_err(|e| PlannerError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Parses a BDD from the textual format.
    pub fn from_bdd_string(&self, content: &str) -> Result<Ref> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('c') && !line.is_empty());

        let header = lines.next().ok_or_else(|| PlannerError::Parse("Missing header".into()))?;
        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 3 || parts[0] != "bdd" {
            return Err(PlannerError::Parse(format!("Invalid header: {}", header)));
        }
        let node_count: usize = parts[1]
            .parse()
            .map_err(|_| PlannerError::Parse(format!("Invalid node count: {}", parts[1])))?;
        let root: i64 = parts[2]
            .parse()
            .map_err(|_| PlannerError::Parse(format!("Invalid root: {}", parts[2])))?;

        let mut nodes: HashMap<i64, Ref> = HashMap::with_capacity(node_count);
        for line in lines {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 5 || parts[0] != "N" {
                return Err(PlannerError::Parse(format!("Invalid node line: {}", line)));
            }
            let numbers = parts[1..]
                .iter()
                .map(|s| s.parse::<i64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| PlannerError::Parse(format!("Invalid number in: {}", line)))?;
            let (id, var) = (numbers[0], numbers[1]);
            if var <= 0 || var > u32::MAX as i64 {
                return Err(PlannerError::Parse(format!("Invalid variable in: {}", line)));
            }
            let low = self.resolve(numbers[2], &nodes)?;
            let high = self.resolve(numbers[3], &nodes)?;
            nodes.insert(id, self.mk_node(var as u32, low, high));
        }

        if nodes.len() != node_count {
            return Err(PlannerError::Parse(format!(
                "Expected {} nodes, found {}",
                node_count,
                nodes.len()
            )));
        }
        self.resolve(root, &nodes)
    }

    fn resolve(&self, r: i64, nodes: &HashMap<i64, Ref>) -> Result<Ref> {
        let node = match r.abs() {
            1 => self.one,
            id => *nodes
                .get(&id)
                .ok_or_else(|| PlannerError::Parse(format!("Unknown node reference: {}", r)))?,
        };
        Ok(if r < 0 { -node } else { node })
    }
}
