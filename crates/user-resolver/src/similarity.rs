//! String similarity scoring for fuzzy matches.

/// Similarity ratio in `[0.0, 1.0]` based on the longest common
/// subsequence: `2 * lcs / (len_a + len_b)`. Two empty strings are
/// identical (1.0).
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let lcs = lcs_len(&a, &b);
    2.0 * lcs as f64 / (a.len() + b.len()) as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    // One-row DP over the shorter string.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0usize; short.len() + 1];

    for &ch in long {
        let mut prev_diag = 0;
        for (j, &sh) in short.iter().enumerate() {
            let prev_row = row[j + 1];
            row[j + 1] = if ch == sh {
                prev_diag + 1
            } else {
                row[j + 1].max(row[j])
            };
            prev_diag = prev_row;
        }
    }
    row[short.len()]
}
