pub type NodeIndex = usize;
pub type EdgeIndex = usize;

use std::collections::VecDeque;

/// A node's weight together with the edges incident to it.
#[derive(Debug, Clone)]
pub struct Node<W: Clone> {
    weight: W,
    preds: Vec<EdgeIndex>,
    succs: Vec<EdgeIndex>,
}

impl<W: Clone> Node<W> {
    fn new(weight: W) -> Self {
        Node {
            weight,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn weight(&self) -> &W {
        &self.weight
    }

    /// Number of edges ending here.
    pub fn in_degree(&self) -> usize {
        self.preds.len()
    }

    /// Number of edges starting here.
    pub fn out_degree(&self) -> usize {
        self.succs.len()
    }
}

#[derive(Debug, Clone)]
pub struct Edge<E: Clone> {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub weight: E,
}

/// Directed multigraph with stable indices. Nodes and edges are never removed.
#[derive(Debug, Clone)]
pub struct DiGraph<N: Clone, E: Clone> {
    nodes: Vec<Node<N>>,
    edges: Vec<Edge<E>>,
}

impl<N: Clone, E: Clone> Default for DiGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Clone, E: Clone> DiGraph<N, E> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, u: NodeIndex) -> &Node<N> {
        &self.nodes[u]
    }

    pub fn nodes(&self) -> &Vec<Node<N>> {
        &self.nodes
    }

    pub fn node_weight_mut(&mut self, u: NodeIndex) -> &mut N {
        &mut self.nodes[u].weight
    }

    pub fn edge(&self, eid: EdgeIndex) -> &Edge<E> {
        &self.edges[eid]
    }

    pub fn add_node(&mut self, weight: N) -> NodeIndex {
        self.nodes.push(Node::new(weight));
        self.nodes.len() - 1
    }

    pub fn add_edge(&mut self, source: NodeIndex, target: NodeIndex, weight: E) -> EdgeIndex {
        let eid = self.edges.len();
        self.edges.push(Edge { from: source, to: target, weight });
        self.nodes[source].succs.push(eid);
        self.nodes[target].preds.push(eid);
        eid
    }

    pub fn successors(&self, u: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes[u].succs.iter().map(move |&eid| self.edges[eid].to)
    }

    /// Returns the nodes reachable from `start` (inclusive), in BFS order.
    pub fn reachable_from(&self, start: NodeIndex) -> Vec<NodeIndex> {
        if start >= self.node_count() {
            return Vec::new();
        }
        let mut seen = vec![false; self.node_count()];
        let mut que = VecDeque::new();
        let mut res = Vec::new();
        seen[start] = true;
        que.push_back(start);
        while let Some(v) = que.pop_front() {
            res.push(v);
            for u in self.successors(v) {
                if !seen[u] {
                    seen[u] = true;
                    que.push_back(u);
                }
            }
        }
        res
    }
}
