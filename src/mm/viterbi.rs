use super::candidate::CandidateGraph;
use super::model::CandidateId;
use std::cmp::Ordering;
use std::ops::Range;

/// Scores and back pointers of one decoding run, indexed like the candidate
/// arena of the graph they were computed on.
#[derive(Debug, Clone)]
pub struct Viterbi {
    scores: Vec<f64>,
    predecessors: Vec<Option<CandidateId>>,
}

impl Viterbi {
    /// Forward pass over every chain of non-empty layers.
    pub fn run(graph: &CandidateGraph) -> Self {
        let size = graph.candidates().len();
        let mut viterbi = Viterbi {
            scores: vec![f64::NEG_INFINITY; size],
            predecessors: vec![None; size],
        };
        for chain in chains(graph) {
            let layers = &graph.layers()[chain];
            for id in &layers[0].candidates {
                viterbi.scores[id.0] = graph.candidate(*id).observation;
            }
            for layer in &layers[1..] {
                for id in &layer.candidates {
                    let observation = graph.candidate(*id).observation;
                    let mut best: Option<(f64, CandidateId)> = None;
                    for connection in graph.incoming(*id) {
                        let score =
                            viterbi.scores[connection.from.0] + observation * connection.transmission;
                        if best.map_or(true, |(current, _)| score > current) {
                            best = Some((score, connection.from));
                        }
                    }
                    if let Some((score, from)) = best {
                        viterbi.scores[id.0] = score;
                        viterbi.predecessors[id.0] = Some(from);
                    }
                }
            }
        }
        viterbi
    }

    pub fn score(&self, id: CandidateId) -> f64 {
        self.scores[id.0]
    }

    pub fn predecessor(&self, id: CandidateId) -> Option<CandidateId> {
        self.predecessors[id.0]
    }

    /// Best candidate sequence of every chain, concatenated in layer order.
    pub fn decode(&self, graph: &CandidateGraph) -> Vec<CandidateId> {
        let mut path = Vec::with_capacity(graph.layers().len());
        for chain in chains(graph) {
            let last = &graph.layers()[chain.end - 1];
            let Some(best) = last.candidates.iter().copied().max_by(|a, b| {
                self.score(*a)
                    .partial_cmp(&self.score(*b))
                    .unwrap_or(Ordering::Equal)
            }) else {
                continue;
            };
            let mut chain_path = vec![best];
            let mut current = best;
            while let Some(previous) = self.predecessor(current) {
                chain_path.push(previous);
                current = previous;
            }
            chain_path.reverse();
            path.extend(chain_path);
        }
        path
    }
}

/// Maximal runs of consecutive layers that all have candidates.
fn chains(graph: &CandidateGraph) -> Vec<Range<usize>> {
    let mut chains = Vec::new();
    let mut start = None;
    for (index, layer) in graph.layers().iter().enumerate() {
        match (layer.candidates.is_empty(), start) {
            (false, None) => start = Some(index),
            (true, Some(begin)) => {
                chains.push(begin..index);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        chains.push(begin..graph.layers().len());
    }
    chains
}
