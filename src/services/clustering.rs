//! Topic clustering and 2D projection over the included corpus.
//!
//! Both are ordered fallback chains of named strategies, each guarded by an
//! applicability precondition; the first applicable strategy that succeeds
//! wins. Exhaustion degrades to the most primitive valid result: a single
//! cluster, or no coordinates at all.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::services::relevance::{dot, normalize};

/// Sentinel cluster id for unclustered papers.
pub const NOISE_CLUSTER: i64 = -1;

/// Literal label for unclustered papers; never generated remotely.
pub const NOISE_LABEL: &str = "Uncategorised";

const RNG_SEED: u64 = 42;

/// A clustering algorithm with an applicability precondition.
///
/// `assign` returns one label per vector, or `None` when the algorithm
/// failed for this input (which sends the chain to the next strategy).
pub trait ClusterStrategy {
    fn name(&self) -> &'static str;
    fn applicable(&self, count: usize) -> bool;
    fn assign(&self, vectors: &[Vec<f32>]) -> Option<Vec<i64>>;
}

/// Density-based clustering with cosine distance. All-noise output counts
/// as failure so the chain can fall through.
pub struct DensityStrategy;

impl ClusterStrategy for DensityStrategy {
    fn name(&self) -> &'static str {
        "density"
    }

    fn applicable(&self, count: usize) -> bool {
        count >= 4
    }

    fn assign(&self, vectors: &[Vec<f32>]) -> Option<Vec<i64>> {
        let min_pts = (vectors.len() / 8).max(2);
        let labels = dbscan(vectors, 0.3, min_pts);
        if labels.iter().all(|&l| l == NOISE_CLUSTER) {
            return None;
        }
        Some(labels)
    }
}

/// Fixed-k partitional fallback, k sized to the corpus.
pub struct PartitionStrategy;

impl ClusterStrategy for PartitionStrategy {
    fn name(&self) -> &'static str {
        "partition"
    }

    fn applicable(&self, count: usize) -> bool {
        count >= 4
    }

    fn assign(&self, vectors: &[Vec<f32>]) -> Option<Vec<i64>> {
        let k = (vectors.len() / 3).clamp(2, 5);
        kmeans(vectors, k)
    }
}

/// Terminal fallback: everything in cluster 0.
pub struct SingleClusterStrategy;

impl ClusterStrategy for SingleClusterStrategy {
    fn name(&self) -> &'static str {
        "single"
    }

    fn applicable(&self, _count: usize) -> bool {
        true
    }

    fn assign(&self, vectors: &[Vec<f32>]) -> Option<Vec<i64>> {
        Some(vec![0; vectors.len()])
    }
}

/// Assign a cluster id per paper by walking the strategy chain.
///
/// With fewer than 4 papers, or without embeddings for every paper, the
/// chain is skipped and everything lands in cluster 0.
pub fn assign_clusters(vectors: &[Vec<f32>], paper_count: usize) -> Vec<i64> {
    if paper_count < 4 || vectors.len() != paper_count {
        return vec![0; paper_count];
    }
    let chain: [&dyn ClusterStrategy; 3] =
        [&DensityStrategy, &PartitionStrategy, &SingleClusterStrategy];
    for strategy in chain {
        if !strategy.applicable(paper_count) {
            continue;
        }
        if let Some(labels) = strategy.assign(vectors) {
            debug!(strategy = strategy.name(), "clustering strategy succeeded");
            return labels;
        }
        debug!(strategy = strategy.name(), "clustering strategy failed");
    }
    vec![0; paper_count]
}

/// A 2D projection algorithm with an applicability precondition.
pub trait ProjectionStrategy {
    fn name(&self) -> &'static str;
    fn applicable(&self, count: usize) -> bool;
    fn project(&self, vectors: &[Vec<f32>]) -> Option<Vec<[f64; 2]>>;
}

/// Neighborhood-preserving nonlinear projection: stochastic stress
/// relaxation against pairwise cosine distances.
pub struct NeighborhoodProjection;

impl ProjectionStrategy for NeighborhoodProjection {
    fn name(&self) -> &'static str {
        "neighborhood"
    }

    fn applicable(&self, count: usize) -> bool {
        count >= 4
    }

    fn project(&self, vectors: &[Vec<f32>]) -> Option<Vec<[f64; 2]>> {
        let n = vectors.len();
        let units: Vec<Vec<f32>> = vectors.iter().map(|v| normalize(v)).collect();
        let mut rng = StdRng::seed_from_u64(RNG_SEED);
        let mut coords: Vec<[f64; 2]> = PcaProjection
            .project(vectors)
            .unwrap_or_else(|| (0..n).map(|_| [rng.gen::<f64>(), rng.gen::<f64>()]).collect());

        let mut pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();
        for epoch in 0..120 {
            let rate = 0.1 * (1.0 - epoch as f64 / 120.0);
            pairs.shuffle(&mut rng);
            for &(i, j) in &pairs {
                let target = (1.0 - dot(&units[i], &units[j])) as f64;
                let dx = coords[j][0] - coords[i][0];
                let dy = coords[j][1] - coords[i][1];
                let dist = (dx * dx + dy * dy).sqrt().max(1e-9);
                let pull = rate * (dist - target) / dist;
                coords[i][0] += pull * dx;
                coords[i][1] += pull * dy;
                coords[j][0] -= pull * dx;
                coords[j][1] -= pull * dy;
            }
        }

        if coords.iter().any(|c| !c[0].is_finite() || !c[1].is_finite()) {
            return None;
        }
        Some(coords)
    }
}

/// Linear fallback: top two principal components via power iteration.
pub struct PcaProjection;

impl ProjectionStrategy for PcaProjection {
    fn name(&self) -> &'static str {
        "pca"
    }

    fn applicable(&self, count: usize) -> bool {
        count >= 4
    }

    fn project(&self, vectors: &[Vec<f32>]) -> Option<Vec<[f64; 2]>> {
        let n = vectors.len();
        let dims = vectors.first()?.len();
        if dims < 2 {
            return None;
        }
        let mut centered: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| v.iter().map(|&x| x as f64).collect())
            .collect();
        for d in 0..dims {
            let mean = centered.iter().map(|row| row[d]).sum::<f64>() / n as f64;
            for row in &mut centered {
                row[d] -= mean;
            }
        }

        let first = principal_component(&centered, None)?;
        let second = principal_component(&centered, Some(&first))?;
        let coords = centered
            .iter()
            .map(|row| {
                [
                    row.iter().zip(&first).map(|(x, c)| x * c).sum(),
                    row.iter().zip(&second).map(|(x, c)| x * c).sum(),
                ]
            })
            .collect::<Vec<[f64; 2]>>();
        if coords.iter().any(|c| !c[0].is_finite() || !c[1].is_finite()) {
            return None;
        }
        Some(coords)
    }
}

/// Project to 2D by walking the strategy chain; `None` omits coordinates.
pub fn project_2d(vectors: &[Vec<f32>]) -> Option<Vec<[f64; 2]>> {
    let chain: [&dyn ProjectionStrategy; 2] = [&NeighborhoodProjection, &PcaProjection];
    for strategy in chain {
        if !strategy.applicable(vectors.len()) {
            continue;
        }
        if let Some(coords) = strategy.project(vectors) {
            debug!(strategy = strategy.name(), "projection strategy succeeded");
            return Some(coords);
        }
        debug!(strategy = strategy.name(), "projection strategy failed");
    }
    None
}

/// Classic DBSCAN over cosine distance, `O(n^2)` neighborhood scans.
fn dbscan(vectors: &[Vec<f32>], eps: f32, min_pts: usize) -> Vec<i64> {
    let n = vectors.len();
    let units: Vec<Vec<f32>> = vectors.iter().map(|v| normalize(v)).collect();
    let neighbors: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && 1.0 - dot(&units[i], &units[j]) <= eps)
                .collect()
        })
        .collect();

    let mut labels = vec![NOISE_CLUSTER; n];
    let mut visited = vec![false; n];
    let mut cluster = 0i64;

    for start in 0..n {
        if visited[start] || neighbors[start].len() + 1 < min_pts {
            continue;
        }
        visited[start] = true;
        labels[start] = cluster;
        let mut frontier = neighbors[start].clone();
        while let Some(point) = frontier.pop() {
            if labels[point] == NOISE_CLUSTER {
                labels[point] = cluster;
            }
            if visited[point] {
                continue;
            }
            visited[point] = true;
            if neighbors[point].len() + 1 >= min_pts {
                frontier.extend(neighbors[point].iter().copied());
            }
        }
        cluster += 1;
    }
    labels
}

/// Lloyd's algorithm over unit vectors with seeded initialization.
fn kmeans(vectors: &[Vec<f32>], k: usize) -> Option<Vec<i64>> {
    let n = vectors.len();
    if k == 0 || n < k {
        return None;
    }
    let units: Vec<Vec<f32>> = vectors.iter().map(|v| normalize(v)).collect();
    let dims = units[0].len();
    let mut rng = StdRng::seed_from_u64(RNG_SEED);
    let mut seed_indices: Vec<usize> = (0..n).collect();
    seed_indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = seed_indices[..k].iter().map(|&i| units[i].clone()).collect();
    let mut labels = vec![0i64; n];

    for _ in 0..50 {
        let mut changed = false;
        for (i, unit) in units.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    dot(unit, a)
                        .partial_cmp(&dot(unit, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(idx, _)| idx as i64)?;
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f32>> = units
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c as i64)
                .map(|(u, _)| u)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut mean = vec![0.0f32; dims];
            for member in &members {
                for (m, v) in mean.iter_mut().zip(member.iter()) {
                    *m += v;
                }
            }
            for m in &mut mean {
                *m /= members.len() as f32;
            }
            *centroid = normalize(&mean);
        }
        if !changed {
            break;
        }
    }
    Some(labels)
}

/// Dominant direction of the centered data, optionally orthogonal to a
/// previously extracted component.
fn principal_component(rows: &[Vec<f64>], deflate: Option<&[f64]>) -> Option<Vec<f64>> {
    let dims = rows.first()?.len();
    let mut rng = StdRng::seed_from_u64(RNG_SEED);
    let mut component: Vec<f64> = (0..dims).map(|_| rng.gen::<f64>() - 0.5).collect();

    for _ in 0..60 {
        if let Some(prev) = deflate {
            let proj: f64 = component.iter().zip(prev).map(|(c, p)| c * p).sum();
            for (c, p) in component.iter_mut().zip(prev) {
                *c -= proj * p;
            }
        }
        // next = X^T (X c)
        let mut next = vec![0.0f64; dims];
        for row in rows {
            let scale: f64 = row.iter().zip(&component).map(|(x, c)| x * c).sum();
            for (n, x) in next.iter_mut().zip(row) {
                *n += scale * x;
            }
        }
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < 1e-12 || !norm.is_finite() {
            return None;
        }
        for v in &mut next {
            *v /= norm;
        }
        component = next;
    }
    Some(component)
}
