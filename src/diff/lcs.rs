#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Keep { old: usize, new: usize },
    Insert(usize),
    Delete(usize),
}

/// Aligns `old` against `new` and returns the edit script in forward order.
///
/// The table is the usual `(m+1) x (n+1)` one. When backtracking hits a tie
/// the new-side element is treated as inserted first, so after reversal a
/// substitution reads as a delete immediately followed by an insert.
pub fn align<T: PartialEq>(old: &[T], new: &[T]) -> Vec<EditOp> {
    let m = old.len();
    let n = new.len();
    let width = n + 1;
    let mut dp = vec![0usize; (m + 1) * width];

    for i in 1..=m {
        for j in 1..=n {
            dp[i * width + j] = if old[i - 1] == new[j - 1] {
                dp[(i - 1) * width + (j - 1)] + 1
            } else {
                dp[(i - 1) * width + j].max(dp[i * width + (j - 1)])
            };
        }
    }

    let mut ops = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            ops.push(EditOp::Keep {
                old: i - 1,
                new: j - 1,
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i * width + (j - 1)] >= dp[(i - 1) * width + j]) {
            ops.push(EditOp::Insert(j - 1));
            j -= 1;
        } else {
            ops.push(EditOp::Delete(i - 1));
            i -= 1;
        }
    }
    ops.reverse();
    ops
}
