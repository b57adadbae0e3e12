//! Metre specifications and subdivision trees.
//!
//! A metre is written either as a time-signature keyword (`"4/4"`, `"6/8"`)
//! or as nested lists of quarter-length weights (`[[1/2,1/2],[1/2,1/2]]`).
//! Both forms become a [`SubdivisionTree`]: each node owns a share of its
//! parent's duration, children in metrical order. The tree is flattened into
//! tiers once so that placements and micro-timing lookups never walk it again.

use crate::error::{Error, Result};
use crate::rational::{ql, RationalDuration};
use std::fmt;
use std::str::FromStr;

/// Time signatures with a built-in subdivision tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeSignature {
    TwoFour,
    ThreeFour,
    FourFour,
    SixEight,
    NineEight,
    TwelveEight,
}

/// Shape of a preset: optional grouping tier, beats, then two subdivision tiers.
struct PresetLayout {
    groups: usize,
    beats_per_group: usize,
    beat: RationalDuration,
    divisions: [usize; 2],
}

impl TimeSignature {
    pub const ALL: [TimeSignature; 6] = [
        TimeSignature::TwoFour,
        TimeSignature::ThreeFour,
        TimeSignature::FourFour,
        TimeSignature::SixEight,
        TimeSignature::NineEight,
        TimeSignature::TwelveEight,
    ];

    /// The keyword used in scripts, e.g. `"6/8"`.
    pub fn keyword(&self) -> &'static str {
        match self {
            TimeSignature::TwoFour => "2/4",
            TimeSignature::ThreeFour => "3/4",
            TimeSignature::FourFour => "4/4",
            TimeSignature::SixEight => "6/8",
            TimeSignature::NineEight => "9/8",
            TimeSignature::TwelveEight => "12/8",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim();
        Self::ALL.into_iter().find(|sig| sig.keyword() == keyword)
    }

    fn layout(&self) -> PresetLayout {
        let simple = |groups, beats_per_group| PresetLayout {
            groups,
            beats_per_group,
            beat: RationalDuration::one(),
            divisions: [2, 2],
        };
        let compound = |groups, beats_per_group| PresetLayout {
            groups,
            beats_per_group,
            beat: ql(3, 2),
            divisions: [3, 2],
        };
        match self {
            TimeSignature::TwoFour => simple(1, 2),
            TimeSignature::ThreeFour => simple(1, 3),
            TimeSignature::FourFour => simple(2, 2),
            TimeSignature::SixEight => compound(1, 2),
            TimeSignature::NineEight => compound(1, 3),
            TimeSignature::TwelveEight => compound(2, 2),
        }
    }

    /// Depth of the beat tier in this preset's tree.
    pub fn beat_depth(&self) -> usize {
        if self.layout().groups > 1 {
            2
        } else {
            1
        }
    }

    /// The top-level entries of the preset tree.
    pub fn nodes(&self) -> Vec<MetreNode> {
        let layout = self.layout();
        let [outer, inner] = layout.divisions;
        let leaf = RationalDuration::new(1, (outer * inner) as i64)
            .map(|fraction| &layout.beat * &fraction)
            .unwrap_or_default();
        let beat = MetreNode::Group(vec![
            MetreNode::Group(vec![MetreNode::Leaf(leaf); inner]);
            outer
        ]);
        let beats = vec![beat; layout.beats_per_group];
        if layout.groups > 1 {
            vec![MetreNode::Group(beats); layout.groups]
        } else {
            beats
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One entry of an explicit metre: a weight, or a list of sub-entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetreNode {
    Leaf(RationalDuration),
    Group(Vec<MetreNode>),
}

impl fmt::Display for MetreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetreNode::Leaf(weight) => write!(f, "{}", weight),
            MetreNode::Group(children) => write_group(f, children),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, children: &[MetreNode]) -> fmt::Result {
    f.write_str("[")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", child)?;
    }
    f.write_str("]")
}

/// A metre as the user wrote it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetreSpec {
    /// A time-signature keyword such as `4/4`.
    Preset(TimeSignature),
    /// Explicit beats; each entry is one beat, nested lists subdivide it.
    Nested(Vec<MetreNode>),
}

impl MetreSpec {
    /// Canonical text form. Two specs share a phase grid iff these match.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetreSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetreSpec::Preset(sig) => write!(f, "{}", sig),
            MetreSpec::Nested(entries) => write_group(f, entries),
        }
    }
}

impl From<TimeSignature> for MetreSpec {
    fn from(sig: TimeSignature) -> Self {
        MetreSpec::Preset(sig)
    }
}

impl FromStr for MetreSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('[') {
            return BracketParser::new(trimmed).parse().map(MetreSpec::Nested);
        }
        TimeSignature::from_keyword(trimmed)
            .map(MetreSpec::Preset)
            .ok_or_else(|| {
                let known: Vec<_> = TimeSignature::ALL.iter().map(|s| s.keyword()).collect();
                Error::MalformedMetre(format!(
                    "unknown time signature '{}', expected one of {} or a nested list",
                    trimmed,
                    known.join(", ")
                ))
            })
    }
}

/// Recursive-descent parser for `[[1/2,1/2],[1/2,1/2]]`.
struct BracketParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> BracketParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<MetreNode>> {
        let entries = self.group()?;
        self.skip_ws();
        if self.pos < self.input.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(entries)
    }

    fn error(&self, message: &str) -> Error {
        Error::MalformedMetre(format!(
            "{} at column {} of '{}'",
            message,
            self.pos + 1,
            self.input
        ))
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn group(&mut self) -> Result<Vec<MetreNode>> {
        self.expect('[')?;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(entries);
            }
            if !entries.is_empty() {
                self.expect(',')?;
            }
            entries.push(self.node()?);
        }
    }

    fn node(&mut self) -> Result<MetreNode> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.group().map(MetreNode::Group),
            Some(_) => {
                let rest = &self.input[self.pos..];
                let len = rest.find(['[', ']', ',']).unwrap_or(rest.len());
                let token = rest[..len].trim();
                let weight = token
                    .parse::<RationalDuration>()
                    .map_err(|e| self.error(&e.to_string()))?;
                self.pos += len;
                Ok(MetreNode::Leaf(weight))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }
}

/// Child indices from the root down to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TreePosition(pub Vec<usize>);

impl fmt::Display for TreePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// A position relative to the beat tier: which beat, then the path below it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MetricalPosition {
    pub beat: usize,
    pub path: Vec<usize>,
}

/// A node of the subdivision tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    weight: RationalDuration,
    children: Vec<Node>,
}

impl Node {
    pub fn weight(&self) -> &RationalDuration {
        &self.weight
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn build(spec: &MetreNode, path: &mut Vec<usize>) -> Result<Node> {
        match spec {
            MetreNode::Leaf(weight) => {
                if !weight.is_positive() {
                    return Err(Error::MalformedMetre(format!(
                        "weight {} at {} must be positive",
                        weight,
                        TreePosition(path.clone())
                    )));
                }
                Ok(Node {
                    weight: weight.clone(),
                    children: Vec::new(),
                })
            }
            MetreNode::Group(entries) => {
                if entries.is_empty() {
                    return Err(Error::MalformedMetre(format!(
                        "empty group at {}",
                        TreePosition(path.clone())
                    )));
                }
                let mut children = Vec::with_capacity(entries.len());
                for (i, entry) in entries.iter().enumerate() {
                    path.push(i);
                    children.push(Node::build(entry, path)?);
                    path.pop();
                }
                let weight = children.iter().map(|c| &c.weight).sum();
                Ok(Node { weight, children })
            }
        }
    }

    fn validate(&self, path: &mut Vec<usize>) -> Result<()> {
        if !self.weight.is_positive() {
            return Err(Error::MalformedMetre(format!(
                "weight {} at {} must be positive",
                self.weight,
                TreePosition(path.clone())
            )));
        }
        if self.children.is_empty() {
            return Ok(());
        }
        let sum: RationalDuration = self.children.iter().map(|c| &c.weight).sum();
        if sum != self.weight {
            return Err(Error::MalformedMetre(format!(
                "children of {} sum to {} instead of {}",
                TreePosition(path.clone()),
                sum,
                self.weight
            )));
        }
        for (i, child) in self.children.iter().enumerate() {
            path.push(i);
            child.validate(path)?;
            path.pop();
        }
        Ok(())
    }

    fn leaf_depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.leaf_depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// A node as seen from one tier of the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierNode {
    /// Offset of the node from the start of the bar.
    pub start: RationalDuration,
    pub weight: RationalDuration,
    pub path: TreePosition,
    /// Actual depth of the node; smaller than the tier's depth for a leaf
    /// standing in for a tier it does not reach.
    pub depth: usize,
    /// `None` above the beat tier.
    pub position: Option<MetricalPosition>,
}

impl TierNode {
    pub fn end(&self) -> RationalDuration {
        &self.start + &self.weight
    }

    fn contains(&self, offset: &RationalDuration) -> bool {
        &self.start <= offset && offset < &self.end()
    }
}

/// An immutable metre tree with precomputed tiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubdivisionTree {
    root: Node,
    beat_depth: usize,
    max_depth: usize,
    tiers: Vec<Vec<TierNode>>,
}

impl SubdivisionTree {
    /// Build and validate the tree for a metre specification.
    pub fn parse(spec: &MetreSpec) -> Result<Self> {
        let (entries, beat_depth) = match spec {
            MetreSpec::Preset(sig) => (sig.nodes(), sig.beat_depth()),
            MetreSpec::Nested(entries) => (entries.clone(), 1),
        };
        let root = Node::build(&MetreNode::Group(entries), &mut Vec::new())?;
        Self::from_root(root, beat_depth)
    }

    fn from_root(root: Node, beat_depth: usize) -> Result<Self> {
        root.validate(&mut Vec::new())?;
        let max_depth = root.leaf_depth();
        if max_depth < beat_depth {
            return Err(Error::MalformedMetre(format!(
                "tree is {} tiers deep but beats sit at depth {}",
                max_depth, beat_depth
            )));
        }

        let mut tiers: Vec<Vec<TierNode>> = (0..=max_depth)
            .map(|depth| {
                let mut tier = Vec::new();
                collect_tier(
                    &root,
                    0,
                    depth,
                    &RationalDuration::zero(),
                    &mut Vec::new(),
                    &mut tier,
                );
                tier
            })
            .collect();

        let beat_paths: Vec<TreePosition> =
            tiers[beat_depth].iter().map(|n| n.path.clone()).collect();
        for tier in tiers.iter_mut().skip(beat_depth) {
            for node in tier.iter_mut() {
                node.position = beat_paths
                    .iter()
                    .position(|beat| node.path.0.starts_with(&beat.0))
                    .map(|beat| MetricalPosition {
                        beat,
                        path: node.path.0[beat_paths[beat].0.len()..].to_vec(),
                    });
            }
        }

        Ok(Self {
            root,
            beat_depth,
            max_depth,
            tiers,
        })
    }

    /// Length of one bar in quarter lengths.
    pub fn root_weight(&self) -> &RationalDuration {
        &self.root.weight
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn beat_depth(&self) -> usize {
        self.beat_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Lowest and highest valid level, inclusive.
    pub fn level_range(&self) -> (i64, i64) {
        (
            -(self.beat_depth as i64),
            (self.max_depth - self.beat_depth) as i64,
        )
    }

    /// Nodes of the tier at `depth`, covering the whole bar.
    pub fn tier(&self, depth: usize) -> Option<&[TierNode]> {
        self.tiers.get(depth).map(Vec::as_slice)
    }

    pub fn beats(&self) -> &[TierNode] {
        &self.tiers[self.beat_depth]
    }

    pub fn beat_count(&self) -> usize {
        self.beats().len()
    }

    pub fn node_at(&self, position: &TreePosition) -> Option<&Node> {
        position
            .0
            .iter()
            .try_fold(&self.root, |node, &i| node.children.get(i))
    }

    /// Map a level onto a tier depth.
    pub fn depth_for_level(&self, level: i64) -> Result<usize> {
        let (min, max) = self.level_range();
        if level < min || level > max {
            return Err(Error::InvalidLevel { level, min, max });
        }
        Ok((self.beat_depth as i64 + level) as usize)
    }

    /// Length covered by `duration` notes at `level`, starting from the node
    /// that contains `offset`.
    ///
    /// Counting wraps into the next bar, so a request longer than what is
    /// left still reports its full length.
    pub fn resolve(
        &self,
        level: i64,
        duration: i64,
        offset: &RationalDuration,
    ) -> Result<RationalDuration> {
        let depth = self.depth_for_level(level)?;
        if duration < 0 {
            return Err(Error::InvalidDuration(duration));
        }
        let tier = &self.tiers[depth];
        let first = tier.iter().position(|n| n.contains(offset)).unwrap_or(0);
        let count = duration as usize;
        let (cycles, rest) = (count / tier.len(), count % tier.len());

        let mut length = self.root_weight() * (cycles as i64);
        for i in 0..rest {
            length += &tier[(first + i) % tier.len()].weight;
        }
        Ok(length)
    }

    /// Nodes at or below the beat tier that begin exactly at `offset`,
    /// outermost first.
    pub fn onsets_at(&self, offset: &RationalDuration) -> Vec<&TierNode> {
        (self.beat_depth..=self.max_depth)
            .filter_map(|depth| {
                self.tiers[depth]
                    .iter()
                    .find(|n| n.depth == depth && &n.start == offset)
            })
            .collect()
    }

    /// Indented dump of the tree, beats marked with `*`.
    pub fn render(&self) -> String {
        let (min, max) = self.level_range();
        let mut out = format!(
            "bar {} (beats at depth {}, levels {}..={})\n",
            self.root.weight, self.beat_depth, min, max
        );
        for child in &self.root.children {
            render_node(child, 1, self.beat_depth, &mut out);
        }
        out
    }
}

fn collect_tier(
    node: &Node,
    depth: usize,
    target: usize,
    start: &RationalDuration,
    path: &mut Vec<usize>,
    out: &mut Vec<TierNode>,
) {
    if depth == target || node.is_leaf() {
        out.push(TierNode {
            start: start.clone(),
            weight: node.weight.clone(),
            path: TreePosition(path.clone()),
            depth,
            position: None,
        });
        return;
    }
    let mut child_start = start.clone();
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        collect_tier(child, depth + 1, target, &child_start, path, out);
        path.pop();
        child_start += &child.weight;
    }
}

fn render_node(node: &Node, depth: usize, beat_depth: usize, out: &mut String) {
    let marker = if depth == beat_depth { " *" } else { "" };
    out.push_str(&format!(
        "{}{}{}\n",
        "  ".repeat(depth),
        node.weight,
        marker
    ));
    for child in &node.children {
        render_node(child, depth + 1, beat_depth, out);
    }
}
