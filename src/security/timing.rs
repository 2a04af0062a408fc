//! Secret comparison that does not leak where two strings differ

/// Compare a stored secret with a candidate in time that depends only on
/// the candidate's length.
pub fn constant_time_eq(expected: &str, candidate: &str) -> bool {
    let expected = expected.as_bytes();
    let length_mismatch = (expected.len() != candidate.len()) as u8;

    let diff = candidate
        .bytes()
        .enumerate()
        .fold(length_mismatch, |acc, (i, byte)| {
            acc | (byte ^ expected.get(i).copied().unwrap_or(!byte))
        });

    diff == 0
}
