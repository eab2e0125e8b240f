//! Reader for grounded PDDL.
//!
//! A grounded problem consists of three files sharing a stem:
//!
//! ```text
//! <stem>Dom.gdl    (define (domain d) (:predicates ...) (:action a :parameters () :precondition E :effect E)*)
//! <stem>Prob.gdl   (define (problem p) (:domain d) (:init (p)*) (:goal E))
//! <stem>Part.gdl   [] (p1) (p2) [] [] (q1) []
//! ```
//!
//! Atoms with several tokens, like `(at truck1 depot)`, are joined with `.`.
//! The predicate `foo` stands for "true".

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{PlannerError, Result};
use crate::expr::Expr;
use crate::model::{Action, GroundedModel, Partition};

const TRUE_PREDICATE: &str = "foo";
const TOTAL_COST: &str = "total-cost";

#[derive(Debug, Clone, Eq, PartialEq)]
enum Token {
    Open,
    Close,
    GroupOpen,
    GroupClose,
    Atom(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut atom = String::new();
    let flush = |atom: &mut String, tokens: &mut Vec<Token>| {
        if !atom.is_empty() {
            tokens.push(Token::Atom(std::mem::take(atom)));
        }
    };
    for line in input.lines() {
        let line = match line.find(';') {
            Some(i) => &line[..i],
            None => line,
        };
        for c in line.chars() {
            let token = match c {
                '(' => Some(Token::Open),
                ')' => Some(Token::Close),
                '[' => Some(Token::GroupOpen),
                ']' => Some(Token::GroupClose),
                c if c.is_whitespace() => None,
                c => {
                    atom.push(c);
                    continue;
                }
            };
            flush(&mut atom, &mut tokens);
            tokens.extend(token);
        }
        flush(&mut atom, &mut tokens);
    }
    tokens
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn keyword(&self) -> Option<String> {
        match self {
            SExpr::List(items) => match items.first() {
                Some(SExpr::Atom(head)) => Some(head.to_ascii_lowercase()),
                _ => None,
            },
            SExpr::Atom(_) => None,
        }
    }

    fn items(&self) -> &[SExpr] {
        match self {
            SExpr::List(items) => items,
            SExpr::Atom(_) => &[],
        }
    }

    fn atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(a) => Some(a),
            SExpr::List(_) => None,
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

impl Parser {
    fn new(input: &str, source: impl Into<String>) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
            source: source.into(),
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> PlannerError {
        PlannerError::Parse(format!("{}: {} (token {})", self.source, message, self.pos))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn sexpr(&mut self) -> Result<SExpr> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Atom(a)) => {
                self.pos += 1;
                Ok(SExpr::Atom(a))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::Close) => {
                            self.pos += 1;
                            return Ok(SExpr::List(items));
                        }
                        None => return Err(self.error("unbalanced parentheses")),
                        _ => items.push(self.sexpr()?),
                    }
                }
            }
            Some(other) => Err(self.error(format!("unexpected {:?}", other))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", token)))
        }
    }
}

/// Name of a grounded atom: `(at a b)` becomes `at.a.b`.
fn atom_name(e: &SExpr, source: &str) -> Result<String> {
    let parts = e
        .items()
        .iter()
        .map(|p| p.atom().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| PlannerError::Parse(format!("{}: expected an atom, got {:?}", source, e)))?;
    Ok(parts.join("."))
}

fn expression(e: &SExpr, source: &str) -> Result<Expr> {
    let items = e.items();
    let args = || items.iter().skip(1).map(|a| expression(a, source)).collect::<Result<Vec<_>>>();
    match e.keyword().as_deref() {
        Some("and") => Ok(Expr::And(args()?)),
        Some("or") => Ok(Expr::Or(args()?)),
        Some("not") if items.len() == 2 => Ok(Expr::not(expression(&items[1], source)?)),
        Some("when") if items.len() == 3 => Ok(Expr::when(
            expression(&items[1], source)?,
            expression(&items[2], source)?,
        )),
        Some(TRUE_PREDICATE) if items.len() == 1 => Ok(Expr::truth()),
        Some(_) => Ok(Expr::Literal(atom_name(e, source)?)),
        None => Err(PlannerError::Parse(format!("{}: malformed expression {:?}", source, e))),
    }
}

/// Effect expression with `(increase (total-cost) N)` terms removed and summed.
fn effect(e: &SExpr, source: &str, cost: &mut Option<u32>) -> Result<Option<Expr>> {
    match e.keyword().as_deref() {
        Some("increase") => {
            let items = e.items();
            let counter = items.get(1).and_then(|c| c.keyword());
            let amount = items.get(2).and_then(|a| a.atom()).and_then(|a| a.parse::<u32>().ok());
            match (counter.as_deref(), amount) {
                (Some(TOTAL_COST), Some(n)) => {
                    *cost = Some(cost.unwrap_or(0) + n);
                    Ok(None)
                }
                _ => Err(PlannerError::Parse(format!("{}: unsupported increase {:?}", source, e))),
            }
        }
        Some("and") => {
            let mut children = Vec::new();
            for child in e.items().iter().skip(1) {
                children.extend(effect(child, source, cost)?);
            }
            Ok(Some(Expr::And(children)))
        }
        Some("when") if e.items().len() == 3 => {
            let items = e.items();
            let condition = expression(&items[1], source)?;
            let mut conditional_cost = None;
            let inner = effect(&items[2], source, &mut conditional_cost)?.unwrap_or_else(Expr::truth);
            if conditional_cost.is_some() {
                return Err(PlannerError::Parse(format!(
                    "{}: conditional cost in {:?} is not supported",
                    source, e
                )));
            }
            Ok(Some(Expr::when(condition, inner)))
        }
        _ => Ok(Some(expression(e, source)?)),
    }
}

fn section<'a>(items: &'a [SExpr], keyword: &str) -> Option<&'a SExpr> {
    items.iter().find(|i| i.keyword().as_deref() == Some(keyword))
}

/// Parse a grounded domain into its actions.
pub fn parse_domain(input: &str, source: &str) -> Result<Vec<Action>> {
    let mut parser = Parser::new(input, source);
    let root = parser.sexpr()?;
    if root.keyword().as_deref() != Some("define") {
        return Err(parser.error("expected (define ...)"));
    }

    let mut actions = Vec::new();
    let mut uses_cost = false;
    for item in root.items().iter().filter(|i| i.keyword().as_deref() == Some(":action")) {
        let items = item.items();
        let name = items
            .get(1)
            .and_then(|n| n.atom())
            .ok_or_else(|| parser.error("action without name"))?
            .to_string();

        let mut precondition = Expr::truth();
        let mut eff = Expr::truth();
        let mut cost = None;
        let mut i = 2;
        while i + 1 < items.len() {
            match items[i].atom().map(str::to_ascii_lowercase).as_deref() {
                Some(":parameters") => {}
                Some(":precondition") => precondition = expression(&items[i + 1], source)?,
                Some(":effect") => {
                    eff = effect(&items[i + 1], source, &mut cost)?.unwrap_or_else(Expr::truth);
                }
                _ => return Err(parser.error(format!("unexpected {:?} in action {}", items[i], name))),
            }
            i += 2;
        }
        uses_cost |= cost.is_some();
        actions.push((name, cost, precondition, eff));
    }

    // Without any cost annotations every action costs 1, otherwise a missing
    // annotation means a free action.
    let default_cost = if uses_cost { 0 } else { 1 };
    Ok(actions
        .into_iter()
        .map(|(name, cost, precondition, effect)| Action {
            name,
            cost: cost.unwrap_or(default_cost),
            precondition,
            effect,
        })
        .collect())
}

/// Parse a grounded problem into the initial atoms and the goal.
pub fn parse_problem(input: &str, source: &str) -> Result<(Vec<String>, Expr)> {
    let mut parser = Parser::new(input, source);
    let root = parser.sexpr()?;
    let items = root.items();

    let init = section(items, ":init").ok_or_else(|| parser.error("missing :init"))?;
    let mut atoms = Vec::new();
    for atom in init.items().iter().skip(1) {
        // Numeric fluents such as (= (total-cost) 0) are not part of the state.
        if atom.keyword().as_deref() == Some("=") {
            continue;
        }
        let name = atom_name(atom, source)?;
        if name != TRUE_PREDICATE {
            atoms.push(name);
        }
    }

    let goal = section(items, ":goal").ok_or_else(|| parser.error("missing :goal"))?;
    let goal = match goal.items() {
        [_, e] => expression(e, source)?,
        _ => return Err(parser.error("malformed :goal")),
    };

    Ok((atoms, goal))
}

/// Parse a partition file into its groups.
pub fn parse_partitions(input: &str, source: &str) -> Result<Vec<Partition>> {
    let mut parser = Parser::new(input, source);
    let mut partitions = Vec::new();
    while !parser.is_done() {
        parser.expect(Token::GroupOpen)?;
        parser.expect(Token::GroupClose)?;
        let mut members = Vec::new();
        while parser.peek() == Some(&Token::Open) {
            let atom = parser.sexpr()?;
            members.push(atom_name(&atom, source)?);
        }
        parser.expect(Token::GroupOpen)?;
        parser.expect(Token::GroupClose)?;
        partitions.push(Partition { members });
    }
    Ok(partitions)
}

/// Paths of the domain and problem files belonging to a partition file.
pub fn companion_paths(partition_path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = partition_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PlannerError::Parse(format!("invalid path {}", partition_path.display())))?;
    let stem = name
        .strip_suffix("Part.gdl")
        .ok_or_else(|| PlannerError::Parse(format!("{}: expected a '*Part.gdl' file", name)))?;
    Ok((
        partition_path.with_file_name(format!("{}Dom.gdl", stem)),
        partition_path.with_file_name(format!("{}Prob.gdl", stem)),
    ))
}

/// Read the three files of a grounded problem and build the model.
pub fn read_model(partition_path: &Path) -> Result<GroundedModel> {
    let (domain_path, problem_path) = companion_paths(partition_path)?;
    let read = |p: &Path| -> Result<(String, String)> { Ok((fs::read_to_string(p)?, p.display().to_string())) };

    let (text, source) = read(&domain_path)?;
    let actions = parse_domain(&text, &source)?;
    let (text, source) = read(&problem_path)?;
    let (init, goal) = parse_problem(&text, &source)?;
    let (text, source) = read(partition_path)?;
    let partitions = parse_partitions(&text, &source)?;

    info!(
        "Read {} actions, {} partitions, {} initial atoms",
        actions.len(),
        partitions.len(),
        init.len()
    );
    GroundedModel::new(actions, init, goal, partitions)
}
