// src/assignment.rs - Minimum-cost bipartite matching (Hungarian method)
use nalgebra::DMatrix;

// Solves the rectangular linear sum assignment problem.
// Returns `(row, col)` pairs sorted by row. Every row is assigned when
// `rows <= cols`, otherwise every column is. Costs must be finite.
pub fn linear_sum_assignment(cost: &DMatrix<f64>) -> Vec<(usize, usize)> {
    if cost.nrows() == 0 || cost.ncols() == 0 {
        return Vec::new();
    }

    if cost.nrows() > cost.ncols() {
        let mut pairs: Vec<(usize, usize)> = solve(&cost.transpose())
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect();
        pairs.sort_unstable();
        return pairs;
    }

    solve(cost)
}

// Shortest augmenting path with row/column potentials, `O(n^2 m)`.
// Requires `nrows <= ncols`.
fn solve(cost: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.shape();

    // 1-based; slot 0 of the column arrays is the virtual start column
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut row_of = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        row_of[0] = i;
        let mut col = 0;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[col] = true;
            let row = row_of[col];
            let mut delta = f64::INFINITY;
            let mut next = 0;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let slack = cost[(row - 1, j - 1)] - u[row] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = col;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    next = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[row_of[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            col = next;
            if row_of[col] == 0 {
                break;
            }
        }

        // flip the augmenting path
        while col != 0 {
            let prev = way[col];
            row_of[col] = row_of[prev];
            col = prev;
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&j| row_of[j] != 0)
        .map(|j| (row_of[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

pub fn total_cost(cost: &DMatrix<f64>, pairs: &[(usize, usize)]) -> f64 {
    pairs.iter().map(|&(r, c)| cost[(r, c)]).sum()
}
