//! Deterministic k-means.
//!
//! - Points are sorted by `(x, y, address)`.
//! - Seed centroid `i` is the sorted point at index `floor(i * N / k)`.
//! - Assignment picks the nearest centroid; ties go to the lowest index.
//! - A cluster left empty takes the point farthest from its own centroid
//!   among clusters with more than one member (ties go to the earliest
//!   sorted point).
//! - Iteration stops at a fixed point or after `max_iterations`.

use meridian_types::NodeIdentity;

use crate::geo::{self, Point};

pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// `ceil(sqrt(n))` in exact integer arithmetic.
pub fn cluster_count(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut k = (n as f64).sqrt() as usize;
    while k * k > n {
        k -= 1;
    }
    while k * k < n {
        k += 1;
    }
    k
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KMeans {
    pub max_iterations: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl KMeans {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Partition `members` into `cluster_count(members.len())` clusters.
    ///
    /// Clusters come back in seed order with members in sorted point order;
    /// callers normalize before signing or scoring.
    pub fn partition(&self, members: &[NodeIdentity]) -> Vec<Vec<NodeIdentity>> {
        let n = members.len();
        let k = cluster_count(n);
        if k == 0 {
            return Vec::new();
        }

        let mut sorted: Vec<(Point, &NodeIdentity)> = members
            .iter()
            .map(|m| (Point::from(&m.geo_location), m))
            .collect();
        sorted.sort_by(|(pa, a), (pb, b)| {
            pa.x.total_cmp(&pb.x)
                .then(pa.y.total_cmp(&pb.y))
                .then(a.account_address.cmp(&b.account_address))
        });
        let points: Vec<Point> = sorted.iter().map(|(p, _)| *p).collect();

        let mut centroids: Vec<Point> = (0..k).map(|i| points[i * n / k]).collect();
        let mut assignment: Vec<usize> = Vec::new();
        let mut iterations = 0;

        while iterations < self.max_iterations.max(1) {
            iterations += 1;
            let mut next = assign(&points, &centroids);
            refill_empty(&points, &centroids, &mut next, k);

            if next == assignment {
                break;
            }
            assignment = next;
            centroids = (0..k)
                .map(|c| {
                    geo::centroid(
                        points
                            .iter()
                            .zip(assignment.iter())
                            .filter(|(_, a)| **a == c)
                            .map(|(p, _)| p),
                    )
                })
                .collect();
        }
        tracing::trace!(nodes = n, clusters = k, iterations, "k-means finished");

        let mut clusters: Vec<Vec<NodeIdentity>> = vec![Vec::new(); k];
        for ((_, member), cluster) in sorted.iter().zip(assignment.iter()) {
            clusters[*cluster].push((*member).clone());
        }
        clusters
    }
}

fn assign(points: &[Point], centroids: &[Point]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let mut best = 0;
            let mut best_distance = p.squared_distance(&centroids[0]);
            for (c, centroid) in centroids.iter().enumerate().skip(1) {
                let d = p.squared_distance(centroid);
                if d < best_distance {
                    best = c;
                    best_distance = d;
                }
            }
            best
        })
        .collect()
}

fn refill_empty(points: &[Point], centroids: &[Point], assignment: &mut [usize], k: usize) {
    let mut sizes = vec![0usize; k];
    for a in assignment.iter() {
        sizes[*a] += 1;
    }

    for empty in 0..k {
        if sizes[empty] != 0 {
            continue;
        }
        let mut donor: Option<(usize, f64)> = None;
        for (i, p) in points.iter().enumerate() {
            let from = assignment[i];
            if sizes[from] <= 1 {
                continue;
            }
            let d = p.squared_distance(&centroids[from]);
            let farther = match donor {
                None => true,
                Some((_, best)) => d > best,
            };
            if farther {
                donor = Some((i, d));
            }
        }
        if let Some((i, _)) = donor {
            sizes[assignment[i]] -= 1;
            assignment[i] = empty;
            sizes[empty] = 1;
        }
    }
}
